//! User-initiated call actions against the PBX.
//!
//! Each action acquires the session gate, validates against the session's
//! owned DNs, issues the vendor command while still holding the gate, then
//! releases it and pushes the updated snapshot. Commands are
//! fire-and-forget-durable: once issued to the vendor they are not undone,
//! even if the invoking connection goes away. The actual state change
//! arrives later through the event bridge.

use std::sync::Arc;

use crate::errors::{CoreError, CoreResult};
use crate::notifier::SessionNotifier;
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::types::SessionSnapshotResponse;

/// Call-control actions an operator may take on their own session.
pub struct SessionActions {
    registry: Arc<SessionRegistry>,
    notifier: Arc<dyn SessionNotifier>,
}

impl SessionActions {
    /// Create the action surface.
    pub fn new(registry: Arc<SessionRegistry>, notifier: Arc<dyn SessionNotifier>) -> Self {
        Self { registry, notifier }
    }

    /// Select which owned extension the operator acts as.
    pub async fn select_extension(
        &self,
        session: &Arc<Session>,
        extension: &str,
    ) -> CoreResult<SessionSnapshotResponse> {
        let extension = extension.trim();
        if extension.is_empty() {
            return Err(CoreError::bad_request("extension must not be empty"));
        }

        {
            let mut state = session.gate().await;
            if !state.dns.contains_key(extension) {
                return Err(CoreError::not_found(format!(
                    "extension {} is not owned by this session",
                    extension
                )));
            }
            state.selected_extension = Some(extension.to_string());
            state.touch();
        }

        self.registry
            .index_extension(&session.session_id, extension);
        self.push_snapshot(session).await
    }

    /// Select the device outgoing PBX calls are anchored on.
    pub async fn set_active_device(
        &self,
        session: &Arc<Session>,
        device_id: &str,
    ) -> CoreResult<SessionSnapshotResponse> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(CoreError::bad_request("device id must not be empty"));
        }

        {
            let mut state = session.gate().await;
            if !state.devices.contains_key(device_id) {
                return Err(CoreError::not_found(format!(
                    "device {} is not registered for this session",
                    device_id
                )));
            }
            state.selected_device = Some(device_id.to_string());
            state.touch();
        }

        self.push_snapshot(session).await
    }

    /// Place an outgoing PBX call from the selected extension.
    pub async fn place_call(
        &self,
        session: &Arc<Session>,
        destination: &str,
    ) -> CoreResult<SessionSnapshotResponse> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(CoreError::bad_request("destination must not be empty"));
        }

        let api = session.pbx_api()?;
        {
            let state = session.gate().await;
            let dn = state
                .selected_extension
                .clone()
                .ok_or_else(|| CoreError::bad_request("no extension selected"))?;
            let device = state.selected_device.clone();
            api.make_call(&dn, device.as_deref(), destination).await?;
        }

        self.push_snapshot(session).await
    }

    /// Answer a ringing participant.
    pub async fn answer(
        &self,
        session: &Arc<Session>,
        participant_id: &str,
    ) -> CoreResult<SessionSnapshotResponse> {
        let api = session.pbx_api()?;
        {
            let state = session.gate().await;
            let dn = validate_participant(&state, participant_id)?;
            api.answer_participant(&dn, participant_id).await?;
        }
        self.push_snapshot(session).await
    }

    /// Reject a ringing participant, diverting it to voicemail.
    pub async fn reject(
        &self,
        session: &Arc<Session>,
        participant_id: &str,
    ) -> CoreResult<SessionSnapshotResponse> {
        let api = session.pbx_api()?;
        {
            let state = session.gate().await;
            let dn = validate_participant(&state, participant_id)?;
            api.divert_participant(&dn, participant_id, true).await?;
        }
        self.push_snapshot(session).await
    }

    /// Hang up a participant.
    pub async fn end(
        &self,
        session: &Arc<Session>,
        participant_id: &str,
    ) -> CoreResult<SessionSnapshotResponse> {
        let api = session.pbx_api()?;
        {
            let state = session.gate().await;
            let dn = validate_participant(&state, participant_id)?;
            api.drop_participant(&dn, participant_id).await?;
        }
        self.push_snapshot(session).await
    }

    /// Blind-transfer a participant to another destination.
    pub async fn transfer(
        &self,
        session: &Arc<Session>,
        participant_id: &str,
        destination: &str,
    ) -> CoreResult<SessionSnapshotResponse> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(CoreError::bad_request("destination must not be empty"));
        }

        let api = session.pbx_api()?;
        {
            let state = session.gate().await;
            let dn = validate_participant(&state, participant_id)?;
            api.transfer_participant(&dn, participant_id, destination)
                .await?;
        }
        self.push_snapshot(session).await
    }

    async fn push_snapshot(&self, session: &Arc<Session>) -> CoreResult<SessionSnapshotResponse> {
        let snapshot = session.snapshot().await;
        self.notifier
            .push_snapshot(&session.session_id, snapshot.clone())
            .await;
        Ok(snapshot)
    }
}

/// Check the participant exists, belongs to an owned DN and may be acted
/// on. Returns the owning DN.
fn validate_participant(
    state: &crate::session::SessionState,
    participant_id: &str,
) -> CoreResult<String> {
    let participant = state
        .participants
        .get(participant_id)
        .ok_or_else(|| CoreError::not_found(format!("unknown participant {}", participant_id)))?;

    if !state.dns.contains_key(&participant.dn) {
        return Err(CoreError::forbidden(format!(
            "participant {} belongs to DN {} which this session does not own",
            participant_id, participant.dn
        )));
    }
    if !participant.direct_control {
        return Err(CoreError::forbidden(format!(
            "participant {} is not under direct control",
            participant_id
        )));
    }
    Ok(participant.dn.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::test_support::RecordingNotifier;
    use crate::pbx::client::{CallControlApi, DnTopology};
    use crate::registry::NullConnector;
    use crate::session::PbxConnection;
    use crate::types::{DnInfo, Participant, participant_status};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        commands: Mutex<Vec<String>>,
        fail_with: Mutex<Option<u16>>,
    }

    impl RecordingApi {
        fn check(&self) -> CoreResult<()> {
            match *self.fail_with.lock() {
                Some(status) => Err(CoreError::upstream(status, "vendor rejected")),
                None => Ok(()),
            }
        }

        fn record(&self, command: String) -> CoreResult<()> {
            self.check()?;
            self.commands.lock().push(command);
            Ok(())
        }
    }

    #[async_trait]
    impl CallControlApi for RecordingApi {
        async fn fetch_topology(&self) -> CoreResult<Vec<DnTopology>> {
            Ok(vec![])
        }

        async fn make_call(
            &self,
            dn: &str,
            device_id: Option<&str>,
            destination: &str,
        ) -> CoreResult<()> {
            self.record(format!(
                "makecall {} {} {}",
                dn,
                device_id.unwrap_or("-"),
                destination
            ))
        }

        async fn answer_participant(&self, dn: &str, participant_id: &str) -> CoreResult<()> {
            self.record(format!("answer {} {}", dn, participant_id))
        }

        async fn drop_participant(&self, dn: &str, participant_id: &str) -> CoreResult<()> {
            self.record(format!("drop {} {}", dn, participant_id))
        }

        async fn divert_participant(
            &self,
            dn: &str,
            participant_id: &str,
            voicemail: bool,
        ) -> CoreResult<()> {
            self.record(format!("divert {} {} vm={}", dn, participant_id, voicemail))
        }

        async fn transfer_participant(
            &self,
            dn: &str,
            participant_id: &str,
            destination: &str,
        ) -> CoreResult<()> {
            self.record(format!("transfer {} {} {}", dn, participant_id, destination))
        }
    }

    struct Fixture {
        actions: SessionActions,
        session: Arc<Session>,
        api: Arc<RecordingApi>,
        registry: Arc<SessionRegistry>,
        notifier: Arc<RecordingNotifier>,
    }

    async fn fixture() -> Fixture {
        let registry = Arc::new(SessionRegistry::new(Arc::new(NullConnector)));
        let notifier = Arc::new(RecordingNotifier::new());
        let session = registry.get_or_create("s1", "alice").await.unwrap();
        let api = Arc::new(RecordingApi::default());
        session.attach_pbx(PbxConnection {
            api: api.clone(),
            events_task: None,
        });

        {
            let mut state = session.gate().await;
            state.dns.insert(
                "100".into(),
                DnInfo {
                    dn: "100".into(),
                    dn_type: Some("Extension".into()),
                    display_name: None,
                },
            );
            state.selected_extension = Some("100".into());
            state.participants.insert(
                "p1".into(),
                Participant {
                    id: "p1".into(),
                    status: participant_status::RINGING.into(),
                    party_caller_id: Some("2001".into()),
                    party_caller_name: None,
                    dn: "100".into(),
                    device_id: None,
                    direct_control: true,
                    call_id: None,
                    leg_id: None,
                },
            );
            state.participants.insert(
                "foreign".into(),
                Participant {
                    id: "foreign".into(),
                    status: participant_status::RINGING.into(),
                    party_caller_id: None,
                    party_caller_name: None,
                    dn: "999".into(),
                    device_id: None,
                    direct_control: true,
                    call_id: None,
                    leg_id: None,
                },
            );
            state.participants.insert(
                "observed".into(),
                Participant {
                    id: "observed".into(),
                    status: participant_status::CONNECTED.into(),
                    party_caller_id: None,
                    party_caller_name: None,
                    dn: "100".into(),
                    device_id: None,
                    direct_control: false,
                    call_id: None,
                    leg_id: None,
                },
            );
        }

        let actions = SessionActions::new(registry.clone(), notifier.clone());
        Fixture {
            actions,
            session,
            api,
            registry,
            notifier,
        }
    }

    #[tokio::test]
    async fn answer_issues_vendor_command() {
        let f = fixture().await;
        f.actions.answer(&f.session, "p1").await.unwrap();
        assert_eq!(f.api.commands.lock().as_slice(), ["answer 100 p1"]);
        assert_eq!(f.notifier.snapshot_count(), 1);
    }

    #[tokio::test]
    async fn unknown_participant_is_not_found() {
        let f = fixture().await;
        let err = f.actions.answer(&f.session, "nope").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(f.api.commands.lock().is_empty());
    }

    #[tokio::test]
    async fn foreign_dn_is_forbidden() {
        let f = fixture().await;
        let err = f.actions.end(&f.session, "foreign").await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn observed_leg_without_control_is_forbidden() {
        let f = fixture().await;
        let err = f.actions.answer(&f.session, "observed").await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn vendor_failure_surfaces_status() {
        let f = fixture().await;
        *f.api.fail_with.lock() = Some(503);
        let err = f.actions.end(&f.session, "p1").await.unwrap_err();
        match err {
            CoreError::UpstreamApi { status, .. } => assert_eq!(status, 503),
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn place_call_requires_destination() {
        let f = fixture().await;
        let err = f.actions.place_call(&f.session, "  ").await.unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));
    }

    #[tokio::test]
    async fn place_call_uses_selected_device() {
        let f = fixture().await;
        {
            let mut state = f.session.gate().await;
            state.devices.insert(
                "d1".into(),
                crate::types::DeviceInfo {
                    device_id: "d1".into(),
                    dn: "100".into(),
                    user_agent: None,
                },
            );
        }
        f.actions
            .set_active_device(&f.session, "d1")
            .await
            .unwrap();
        f.actions.place_call(&f.session, "2002").await.unwrap();
        assert_eq!(
            f.api.commands.lock().last().unwrap(),
            "makecall 100 d1 2002"
        );
    }

    #[tokio::test]
    async fn reject_diverts_to_voicemail() {
        let f = fixture().await;
        f.actions.reject(&f.session, "p1").await.unwrap();
        assert_eq!(f.api.commands.lock().as_slice(), ["divert 100 p1 vm=true"]);
    }

    #[tokio::test]
    async fn transfer_validates_destination() {
        let f = fixture().await;
        let err = f
            .actions
            .transfer(&f.session, "p1", "")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));

        f.actions.transfer(&f.session, "p1", "2002").await.unwrap();
        assert_eq!(f.api.commands.lock().as_slice(), ["transfer 100 p1 2002"]);
    }

    #[tokio::test]
    async fn select_extension_updates_index() {
        let f = fixture().await;
        f.actions
            .select_extension(&f.session, "100")
            .await
            .unwrap();
        assert!(f.registry.find_by_extension("100").is_some());

        let err = f
            .actions
            .select_extension(&f.session, "404")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
