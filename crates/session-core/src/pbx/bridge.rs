//! Reconciles vendor events into session state.
//!
//! The bridge is the production [`PbxConnector`]: attaching a session pulls
//! the full topology under the gate, then a background task consumes the
//! event websocket, applying each event under the gate and pushing a fresh
//! snapshot afterwards. The event task reconnects with capped exponential
//! backoff and keeps the session's connected flag honest across outages.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::Instrument;
use webcall_infra_common::logging::LogContext;

use crate::cdr::{CallDetailRecord, CdrKind, CdrSink};
use crate::errors::CoreResult;
use crate::notifier::SessionNotifier;
use crate::pbx::client::{CallControlApi, DnTopology, PbxClient, PbxConfig};
use crate::pbx::events::{EntityKind, EntityPath, PbxEvent, PbxEventType};
use crate::pbx::stream::PbxEventStream;
use crate::registry::PbxConnector;
use crate::session::{PbxConnection, Session};
use crate::types::{CallDirection, DeviceInfo, DnInfo, Participant, participant_status};

/// Production PBX connector and event reconciler.
pub struct PbxBridge {
    config: PbxConfig,
    notifier: Arc<dyn SessionNotifier>,
    cdr: Arc<dyn CdrSink>,
}

impl PbxBridge {
    /// Create a bridge for `config`.
    pub fn new(
        config: PbxConfig,
        notifier: Arc<dyn SessionNotifier>,
        cdr: Arc<dyn CdrSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            notifier,
            cdr,
        })
    }

    /// Replace the session's topology wholesale.
    pub async fn apply_topology(&self, session: &Arc<Session>, topology: Vec<DnTopology>) {
        {
            let mut state = session.gate().await;
            state.dns.clear();
            state.devices.clear();
            state.participants.clear();

            for entry in topology {
                for device in entry.devices {
                    state.devices.insert(device.device_id.clone(), device);
                }
                for participant in entry.participants {
                    seed_participant_facts(&mut state, &participant);
                    state
                        .participants
                        .insert(participant.id.clone(), participant);
                }
                state.dns.insert(entry.dn.dn.clone(), entry.dn);
            }

            if state.home_extension.is_none() {
                state.home_extension = pick_home_extension(&state.dns);
            }
            if state.selected_extension.is_none() {
                state.selected_extension = state.home_extension.clone();
            }
            state.touch();
        }

        self.push_snapshot(session).await;
    }

    /// Apply one vendor event to the session and push the result.
    pub async fn apply_event(&self, session: &Arc<Session>, event: PbxEvent) {
        match event.event_type {
            PbxEventType::Upset | PbxEventType::Remove => {
                self.apply_topology_event(session, event).await;
            }
            PbxEventType::DtmfString | PbxEventType::PromptPlaybackFinished => {
                let event_type = match event.event_type {
                    PbxEventType::DtmfString => "DtmfString",
                    _ => "PromptPlaybackFinished",
                };
                self.notifier
                    .push_event(
                        &session.session_id,
                        event_type,
                        event.attached_data.unwrap_or(serde_json::Value::Null),
                    )
                    .await;
            }
        }
    }

    async fn apply_topology_event(&self, session: &Arc<Session>, event: PbxEvent) {
        let Some(path) = EntityPath::parse(&event.entity) else {
            tracing::debug!(entity = %event.entity, "ignoring event for untracked entity");
            return;
        };

        let mut ended_leg: Option<CallDetailRecord> = None;
        {
            let mut state = session.gate().await;
            match (event.event_type, path.kind) {
                (PbxEventType::Upset, EntityKind::Devices) => {
                    match parse_payload::<DeviceInfo>(event.attached_data) {
                        Some(device) => {
                            ensure_dn(&mut state.dns, &path.dn);
                            state.devices.insert(device.device_id.clone(), device);
                        }
                        None => {
                            tracing::warn!(entity = %event.entity, "device upsert without payload");
                            return;
                        }
                    }
                }
                (PbxEventType::Upset, EntityKind::Participants) => {
                    match parse_payload::<Participant>(event.attached_data) {
                        Some(participant) => {
                            ensure_dn(&mut state.dns, &path.dn);
                            seed_participant_facts(&mut state, &participant);
                            state
                                .participants
                                .insert(participant.id.clone(), participant);
                        }
                        None => {
                            tracing::warn!(entity = %event.entity, "participant upsert without payload");
                            return;
                        }
                    }
                }
                (PbxEventType::Remove, EntityKind::Devices) => {
                    state.devices.remove(&path.id);
                }
                (PbxEventType::Remove, EntityKind::Participants) => {
                    let removed = state.participants.remove(&path.id);
                    let connected_at = state.connected_at.remove(&path.id);
                    state.directions.remove(&path.id);

                    if let (Some(participant), Some(connected_at)) = (removed, connected_at) {
                        ended_leg = Some(CallDetailRecord {
                            call_id: participant.id.clone(),
                            kind: CdrKind::Pbx,
                            from_extension: participant.dn.clone(),
                            to_extension: participant
                                .party_caller_id
                                .clone()
                                .unwrap_or_default(),
                            started_at: connected_at,
                            answered_at: Some(connected_at),
                            ended_at: Utc::now(),
                            end_reason: None,
                        });
                    }
                }
                _ => {}
            }
            state.touch();
        }

        if let Some(record) = ended_leg {
            self.cdr.write(&record).await;
        }
        self.push_snapshot(session).await;
    }

    /// Mark the event stream up or down and push the change.
    pub async fn set_stream_connected(&self, session: &Arc<Session>, connected: bool) {
        {
            let mut state = session.gate().await;
            state.pbx_ws_connected = connected;
            state.touch();
        }
        self.push_snapshot(session).await;
    }

    async fn push_snapshot(&self, session: &Arc<Session>) {
        let snapshot = session.snapshot().await;
        self.notifier
            .push_snapshot(&session.session_id, snapshot)
            .await;
    }

    async fn run_event_loop(self: Arc<Self>, session: Arc<Session>) {
        let url = self.config.event_stream_url();
        let mut backoff = Duration::from_secs(1);

        loop {
            match PbxEventStream::connect(&url, &self.config.token).await {
                Ok(mut stream) => {
                    backoff = Duration::from_secs(1);
                    self.set_stream_connected(&session, true).await;

                    loop {
                        match stream.next_event().await {
                            Ok(Some(event)) => self.apply_event(&session, event).await,
                            Ok(None) => {
                                tracing::info!(
                                    session_id = %session.session_id,
                                    "PBX event stream closed"
                                );
                                break;
                            }
                            Err(e) => {
                                tracing::warn!(
                                    session_id = %session.session_id,
                                    error = %e,
                                    "PBX event stream failed"
                                );
                                break;
                            }
                        }
                    }
                    self.set_stream_connected(&session, false).await;
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        error = %e,
                        "PBX event stream connect failed"
                    );
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.config.max_reconnect_backoff);
        }
    }
}

#[async_trait]
impl PbxConnector for PbxBridge {
    async fn attach(&self, session: &Arc<Session>) -> CoreResult<()> {
        let api: Arc<dyn CallControlApi> = PbxClient::shared(self.config.clone())?;

        let topology = api.fetch_topology().await?;
        self.apply_topology(session, topology).await;

        let bridge = Arc::new(Self {
            config: self.config.clone(),
            notifier: self.notifier.clone(),
            cdr: self.cdr.clone(),
        });
        let span = LogContext::with_operation("pbx-bridge", "event-loop")
            .with_field("session", session.session_id.as_str())
            .span(tracing::Level::INFO);
        let events_task = tokio::spawn(bridge.run_event_loop(session.clone()).instrument(span));

        session.attach_pbx(PbxConnection {
            api,
            events_task: Some(events_task),
        });
        tracing::info!(session_id = %session.session_id, "PBX connection attached");
        Ok(())
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(payload: Option<serde_json::Value>) -> Option<T> {
    let value = payload?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(error = %e, "malformed event payload");
            None
        }
    }
}

fn ensure_dn(dns: &mut std::collections::HashMap<String, DnInfo>, dn: &str) {
    dns.entry(dn.to_string()).or_insert_with(|| DnInfo {
        dn: dn.to_string(),
        dn_type: None,
        display_name: None,
    });
}

/// Stamp derived participant facts that the vendor does not deliver.
fn seed_participant_facts(state: &mut crate::session::SessionState, participant: &Participant) {
    if !state.directions.contains_key(&participant.id) {
        let direction = match participant.status.as_str() {
            participant_status::DIALING => Some(CallDirection::Outbound),
            participant_status::RINGING => Some(CallDirection::Inbound),
            _ => None,
        };
        if let Some(direction) = direction {
            state.directions.insert(participant.id.clone(), direction);
        }
    }
    if participant.is_connected() && !state.connected_at.contains_key(&participant.id) {
        state.connected_at.insert(participant.id.clone(), Utc::now());
    }
}

fn pick_home_extension(dns: &std::collections::HashMap<String, DnInfo>) -> Option<String> {
    let mut extensions: Vec<&DnInfo> = dns
        .values()
        .filter(|d| d.dn_type.as_deref() == Some("Extension"))
        .collect();
    extensions.sort_by(|a, b| a.dn.cmp(&b.dn));
    extensions
        .first()
        .map(|d| d.dn.clone())
        .or_else(|| dns.keys().min().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdr::TracingCdrSink;
    use crate::notifier::test_support::RecordingNotifier;

    fn bridge_with_notifier() -> (Arc<PbxBridge>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let bridge = PbxBridge::new(
            PbxConfig::default(),
            notifier.clone(),
            Arc::new(TracingCdrSink),
        );
        (bridge, notifier)
    }

    fn upsert_participant(dn: &str, id: &str, status: &str) -> PbxEvent {
        PbxEvent {
            event_type: PbxEventType::Upset,
            entity: format!("/callcontrol/{}/participants/{}", dn, id),
            attached_data: Some(serde_json::json!({
                "id": id,
                "status": status,
                "dn": dn,
                "directControl": true
            })),
        }
    }

    fn remove_participant(dn: &str, id: &str) -> PbxEvent {
        PbxEvent {
            event_type: PbxEventType::Remove,
            entity: format!("/callcontrol/{}/participants/{}", dn, id),
            attached_data: None,
        }
    }

    #[tokio::test]
    async fn topology_seeds_home_extension() {
        let (bridge, notifier) = bridge_with_notifier();
        let session = Arc::new(Session::new("s1", "alice"));

        let topology: Vec<DnTopology> = serde_json::from_value(serde_json::json!([
            {"dn": "8000", "dnType": "Queue"},
            {"dn": "101", "dnType": "Extension"},
            {"dn": "100", "dnType": "Extension"}
        ]))
        .unwrap();
        bridge.apply_topology(&session, topology).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.home_extension.as_deref(), Some("100"));
        assert_eq!(snapshot.selected_extension.as_deref(), Some("100"));
        assert_eq!(snapshot.dns.len(), 3);
        assert_eq!(notifier.snapshot_count(), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_participant_wholesale() {
        let (bridge, _notifier) = bridge_with_notifier();
        let session = Arc::new(Session::new("s1", "alice"));

        let mut first = upsert_participant("100", "p1", participant_status::RINGING);
        first.attached_data = Some(serde_json::json!({
            "id": "p1", "status": "Ringing", "dn": "100",
            "partyCallerName": "Front Desk"
        }));
        bridge.apply_event(&session, first).await;
        bridge
            .apply_event(
                &session,
                upsert_participant("100", "p1", participant_status::CONNECTED),
            )
            .await;

        let state = session.gate().await;
        let p = state.participants.get("p1").unwrap();
        assert_eq!(p.status, participant_status::CONNECTED);
        // Last write wins: the earlier caller name is not merged in.
        assert!(p.party_caller_name.is_none());
    }

    #[tokio::test]
    async fn connected_at_is_stamped_once() {
        let (bridge, _notifier) = bridge_with_notifier();
        let session = Arc::new(Session::new("s1", "alice"));

        bridge
            .apply_event(
                &session,
                upsert_participant("100", "p1", participant_status::RINGING),
            )
            .await;
        assert!(session.gate().await.connected_at.get("p1").is_none());

        bridge
            .apply_event(
                &session,
                upsert_participant("100", "p1", participant_status::CONNECTED),
            )
            .await;
        let stamped = *session.gate().await.connected_at.get("p1").unwrap();

        bridge
            .apply_event(
                &session,
                upsert_participant("100", "p1", participant_status::CONNECTED),
            )
            .await;
        assert_eq!(*session.gate().await.connected_at.get("p1").unwrap(), stamped);
    }

    #[tokio::test]
    async fn direction_inferred_from_first_status() {
        let (bridge, _notifier) = bridge_with_notifier();
        let session = Arc::new(Session::new("s1", "alice"));

        bridge
            .apply_event(
                &session,
                upsert_participant("100", "out", participant_status::DIALING),
            )
            .await;
        bridge
            .apply_event(
                &session,
                upsert_participant("100", "in", participant_status::RINGING),
            )
            .await;
        // A later status change must not rewrite the inferred direction.
        bridge
            .apply_event(
                &session,
                upsert_participant("100", "in", participant_status::CONNECTED),
            )
            .await;

        let state = session.gate().await;
        assert_eq!(state.directions.get("out"), Some(&CallDirection::Outbound));
        assert_eq!(state.directions.get("in"), Some(&CallDirection::Inbound));
    }

    #[tokio::test]
    async fn remove_clears_derived_facts() {
        let (bridge, notifier) = bridge_with_notifier();
        let session = Arc::new(Session::new("s1", "alice"));

        bridge
            .apply_event(
                &session,
                upsert_participant("100", "p1", participant_status::CONNECTED),
            )
            .await;
        bridge
            .apply_event(&session, remove_participant("100", "p1"))
            .await;

        let state = session.gate().await;
        assert!(state.participants.is_empty());
        assert!(state.connected_at.is_empty());
        assert!(state.directions.is_empty());
        drop(state);
        // One snapshot per applied event.
        assert_eq!(notifier.snapshot_count(), 2);
    }

    #[tokio::test]
    async fn dtmf_is_forwarded_not_stored() {
        let (bridge, notifier) = bridge_with_notifier();
        let session = Arc::new(Session::new("s1", "alice"));

        bridge
            .apply_event(
                &session,
                PbxEvent {
                    event_type: PbxEventType::DtmfString,
                    entity: "/callcontrol/100/participants/p1".into(),
                    attached_data: Some(serde_json::json!({"digits": "42#"})),
                },
            )
            .await;

        assert_eq!(notifier.snapshot_count(), 0);
        let pushed = notifier.pushed.lock();
        assert_eq!(pushed.len(), 1);
    }

    #[tokio::test]
    async fn untracked_entity_is_ignored() {
        let (bridge, notifier) = bridge_with_notifier();
        let session = Arc::new(Session::new("s1", "alice"));

        bridge
            .apply_event(
                &session,
                PbxEvent {
                    event_type: PbxEventType::Upset,
                    entity: "/callcontrol/100/queues/q1".into(),
                    attached_data: None,
                },
            )
            .await;

        assert_eq!(notifier.snapshot_count(), 0);
        assert!(session.gate().await.participants.is_empty());
    }
}
