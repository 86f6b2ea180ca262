//! One operator's live telephony context.
//!
//! Everything mutable about a session sits behind a single `tokio` mutex -
//! the session gate. The PBX event bridge and user-initiated actions both
//! take the gate before touching the maps, which makes all mutations to one
//! session totally ordered. Holding the gate across an awaited vendor call
//! is intentional: commands and event application must not interleave. The
//! guard pattern releases the gate on every exit path.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::errors::{CoreError, CoreResult};
use crate::pbx::client::CallControlApi;
use crate::types::{
    CallDirection, DeviceInfo, DnInfo, Participant, ParticipantSnapshot, SessionSnapshotResponse,
};

/// Live PBX connection owned by a session: the command API plus the event
/// stream task feeding the session.
pub struct PbxConnection {
    /// Command surface against the vendor call-control API
    pub api: Arc<dyn CallControlApi>,
    /// Background task consuming the vendor event websocket
    pub events_task: Option<tokio::task::JoinHandle<()>>,
}

/// Mutable session state, only reachable through the gate.
#[derive(Debug)]
pub struct SessionState {
    /// Home extension discovered from the topology
    pub home_extension: Option<String>,
    /// Extension the operator currently acts as
    pub selected_extension: Option<String>,
    /// Device id outgoing PBX calls are anchored on
    pub selected_device: Option<String>,
    /// Known DNs by number
    pub dns: HashMap<String, DnInfo>,
    /// Known devices by device id
    pub devices: HashMap<String, DeviceInfo>,
    /// Current call legs by participant id
    pub participants: HashMap<String, Participant>,
    /// First time each participant was seen connected
    pub connected_at: HashMap<String, DateTime<Utc>>,
    /// Direction inferred from the first status each participant was seen in
    pub directions: HashMap<String, CallDirection>,
    /// Whether the PBX event websocket is currently up
    pub pbx_ws_connected: bool,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            home_extension: None,
            selected_extension: None,
            selected_device: None,
            dns: HashMap::new(),
            devices: HashMap::new(),
            participants: HashMap::new(),
            connected_at: HashMap::new(),
            directions: HashMap::new(),
            pbx_ws_connected: false,
            updated_at: Utc::now(),
        }
    }

    /// Record that state changed now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn build_snapshot(&self, username: &str) -> SessionSnapshotResponse {
        let mut participants: Vec<ParticipantSnapshot> = self
            .participants
            .values()
            .map(|p| ParticipantSnapshot {
                participant: p.clone(),
                connected_at: self.connected_at.get(&p.id).copied(),
                direction: self.directions.get(&p.id).copied(),
            })
            .collect();
        participants.sort_by(|a, b| a.participant.id.cmp(&b.participant.id));

        let mut dns: Vec<DnInfo> = self.dns.values().cloned().collect();
        dns.sort_by(|a, b| a.dn.cmp(&b.dn));

        let mut devices: Vec<DeviceInfo> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        SessionSnapshotResponse {
            username: username.to_string(),
            home_extension: self.home_extension.clone(),
            selected_extension: self.selected_extension.clone(),
            selected_device: self.selected_device.clone(),
            pbx_connected: self.pbx_ws_connected,
            dns,
            devices,
            participants,
            updated_at: self.updated_at,
        }
    }
}

/// One session per authenticated operator.
///
/// Created lazily on the first authenticated realtime connection or API
/// call, destroyed only on explicit logout. A browser refresh drops the
/// connection but keeps the session, so an in-progress call survives.
pub struct Session {
    /// Opaque session token, the primary key
    pub session_id: String,
    /// Owning username
    pub username: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    pbx: parking_lot::Mutex<Option<PbxConnection>>,
    attach_once: tokio::sync::OnceCell<()>,
}

impl Session {
    /// Create a fresh session with empty state.
    pub fn new(session_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            username: username.into(),
            created_at: Utc::now(),
            state: Mutex::new(SessionState::new()),
            pbx: parking_lot::Mutex::new(None),
            attach_once: tokio::sync::OnceCell::new(),
        }
    }

    /// Acquire the session gate.
    ///
    /// All mutation of session state happens while the returned guard is
    /// held. The guard may be held across awaited vendor calls; those run
    /// under a bounded timeout so the gate cannot be held indefinitely.
    pub async fn gate(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Produce a display-ready snapshot of the current state.
    pub async fn snapshot(&self) -> SessionSnapshotResponse {
        let state = self.state.lock().await;
        state.build_snapshot(&self.username)
    }

    /// Run the attach closure exactly once for this session's lifetime.
    ///
    /// Concurrent callers await the same attach attempt; a failed attempt
    /// leaves the session unattached so a later call can retry.
    pub async fn ensure_attached<F, Fut>(&self, attach: F) -> CoreResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = CoreResult<()>>,
    {
        self.attach_once.get_or_try_init(attach).await?;
        Ok(())
    }

    /// Store the live PBX connection.
    pub fn attach_pbx(&self, connection: PbxConnection) {
        *self.pbx.lock() = Some(connection);
    }

    /// The command API, if a PBX connection is attached.
    pub fn pbx_api(&self) -> CoreResult<Arc<dyn CallControlApi>> {
        self.pbx
            .lock()
            .as_ref()
            .map(|c| c.api.clone())
            .ok_or_else(|| CoreError::internal("PBX connection not attached"))
    }

    /// Take the PBX connection out, leaving the session unattached.
    pub fn detach_pbx(&self) -> Option<PbxConnection> {
        self.pbx.lock().take()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("username", &self.username)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::participant_status;

    fn participant(id: &str, status: &str, dn: &str) -> Participant {
        Participant {
            id: id.into(),
            status: status.into(),
            party_caller_id: None,
            party_caller_name: None,
            dn: dn.into(),
            device_id: None,
            direct_control: true,
            call_id: None,
            leg_id: None,
        }
    }

    #[tokio::test]
    async fn snapshot_reflects_state() {
        let session = Session::new("s1", "alice");
        {
            let mut state = session.gate().await;
            state.home_extension = Some("100".into());
            state.selected_extension = Some("100".into());
            state.participants.insert(
                "p1".into(),
                participant("p1", participant_status::CONNECTED, "100"),
            );
            state.connected_at.insert("p1".into(), Utc::now());
            state.touch();
        }

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.username, "alice");
        assert_eq!(snapshot.selected_extension.as_deref(), Some("100"));
        assert_eq!(snapshot.participants.len(), 1);
        assert!(snapshot.participants[0].connected_at.is_some());
    }

    #[tokio::test]
    async fn snapshot_orders_participants_by_id() {
        let session = Session::new("s1", "alice");
        {
            let mut state = session.gate().await;
            for id in ["b", "a", "c"] {
                state
                    .participants
                    .insert(id.into(), participant(id, participant_status::RINGING, "100"));
            }
        }
        let snapshot = session.snapshot().await;
        let ids: Vec<_> = snapshot
            .participants
            .iter()
            .map(|p| p.participant.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn ensure_attached_runs_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let session = Session::new("s1", "alice");
        let attempts = AtomicUsize::new(0);

        session
            .ensure_attached(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        session
            .ensure_attached(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_attach_can_retry() {
        let session = Session::new("s1", "alice");
        let first = session
            .ensure_attached(|| async { Err(CoreError::upstream(503, "unavailable")) })
            .await;
        assert!(first.is_err());

        session
            .ensure_attached(|| async { Ok(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pbx_api_requires_attachment() {
        let session = Session::new("s1", "alice");
        assert!(session.pbx_api().is_err());
    }

    #[tokio::test]
    async fn gate_serializes_mutation() {
        let session = Arc::new(Session::new("s1", "alice"));

        // Two tasks each append their marker under the gate; interleaving
        // within one critical section would corrupt the even/odd pairing.
        let mut handles = Vec::new();
        for task in 0..2u64 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let mut state = session.gate().await;
                    let count = state.connected_at.len() as u64;
                    state
                        .connected_at
                        .insert(format!("{}-{}", task, count), Utc::now());
                    tokio::task::yield_now().await;
                    state.touch();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let state = session.gate().await;
        assert_eq!(state.connected_at.len(), 100);
    }
}
