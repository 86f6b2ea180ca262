//! Data model shared between the PBX bridge, the session store and the
//! realtime surface.
//!
//! Participant status values are vendor strings; the well-known ones are
//! collected in [`participant_status`] but unknown values are preserved
//! verbatim, since the PBX may emit states this crate has no opinion on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known participant status strings delivered by the PBX.
pub mod participant_status {
    /// Outbound leg, not yet ringing on the far side
    pub const DIALING: &str = "Dialing";
    /// Inbound leg, ringing on a device
    pub const RINGING: &str = "Ringing";
    /// Media established
    pub const CONNECTED: &str = "Connected";
}

/// Inferred direction of a PBX call leg.
///
/// The vendor does not deliver this; it is derived from the first status a
/// participant is seen in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Leg first seen dialing out
    Outbound,
    /// Leg first seen ringing in
    Inbound,
}

/// Topology information for one directory number owned by the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnInfo {
    /// The directory number itself (extension, queue or trunk number)
    pub dn: String,
    /// Vendor DN type string, e.g. "Extension" or "Queue"
    #[serde(default)]
    pub dn_type: Option<String>,
    /// Display name configured on the PBX
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A device registered against a DN.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Vendor device identifier
    pub device_id: String,
    /// Owning DN
    pub dn: String,
    /// User agent string reported by the device
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// One call leg on the PBX side.
///
/// A refresh replaces the prior snapshot for the same id wholesale; there is
/// no partial-field merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Participant id, scoped to the owning DN by the vendor
    pub id: String,
    /// Vendor status string, see [`participant_status`]
    pub status: String,
    /// Remote party number, if known
    #[serde(default)]
    pub party_caller_id: Option<String>,
    /// Remote party display name, if known
    #[serde(default)]
    pub party_caller_name: Option<String>,
    /// Owning DN
    pub dn: String,
    /// Device the leg is anchored on
    #[serde(default)]
    pub device_id: Option<String>,
    /// Whether this session may act on the leg
    #[serde(default)]
    pub direct_control: bool,
    /// Vendor call correlation id
    #[serde(default)]
    pub call_id: Option<i64>,
    /// Vendor leg correlation id
    #[serde(default)]
    pub leg_id: Option<i64>,
}

impl Participant {
    /// Whether the leg is in the connected status
    pub fn is_connected(&self) -> bool {
        self.status == participant_status::CONNECTED
    }
}

/// A participant as pushed to clients: the raw snapshot plus derived facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    /// The vendor-delivered leg snapshot
    #[serde(flatten)]
    pub participant: Participant,
    /// When the leg first transitioned into connected, if it has
    pub connected_at: Option<DateTime<Utc>>,
    /// Inferred direction, if the first-seen status allowed inferring one
    pub direction: Option<CallDirection>,
}

/// Full display-ready view of one session, pushed after every applied
/// change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshotResponse {
    /// Owning username
    pub username: String,
    /// Home extension discovered from the topology
    pub home_extension: Option<String>,
    /// Currently selected extension
    pub selected_extension: Option<String>,
    /// Currently selected device id
    pub selected_device: Option<String>,
    /// Whether the PBX event websocket is currently connected
    pub pbx_connected: bool,
    /// DNs owned by this session
    pub dns: Vec<DnInfo>,
    /// Devices registered against the owned DNs
    pub devices: Vec<DeviceInfo>,
    /// Current call legs with derived facts merged in
    pub participants: Vec<ParticipantSnapshot>,
    /// When the session state last changed
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_parses_vendor_payload() {
        let raw = serde_json::json!({
            "id": "42",
            "status": "Ringing",
            "partyCallerId": "2001",
            "partyCallerName": "Front Desk",
            "dn": "101",
            "directControl": true,
            "callId": 7
        });
        let p: Participant = serde_json::from_value(raw).unwrap();
        assert_eq!(p.id, "42");
        assert_eq!(p.status, participant_status::RINGING);
        assert_eq!(p.party_caller_id.as_deref(), Some("2001"));
        assert!(p.direct_control);
        assert_eq!(p.call_id, Some(7));
        assert_eq!(p.leg_id, None);
        assert!(!p.is_connected());
    }

    #[test]
    fn unknown_status_is_preserved() {
        let raw = serde_json::json!({"id": "1", "status": "WaitingForNewParty", "dn": "100"});
        let p: Participant = serde_json::from_value(raw).unwrap();
        assert_eq!(p.status, "WaitingForNewParty");
        assert!(!p.is_connected());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = SessionSnapshotResponse {
            username: "alice".into(),
            home_extension: Some("100".into()),
            selected_extension: Some("100".into()),
            selected_device: None,
            pbx_connected: true,
            dns: vec![],
            devices: vec![],
            participants: vec![],
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["homeExtension"], "100");
        assert_eq!(value["pbxConnected"], true);
        assert!(value.get("home_extension").is_none());
    }
}
