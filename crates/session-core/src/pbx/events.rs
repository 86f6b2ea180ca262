//! Vendor event frames and entity-path parsing.

use serde::{Deserialize, Serialize};

/// Event types delivered on the vendor websocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PbxEventType {
    /// An entity was created or replaced; the payload carries its new body
    Upset,
    /// An entity was removed
    Remove,
    /// DTMF digits were collected on a leg
    DtmfString,
    /// A prompt finished playing on a leg
    PromptPlaybackFinished,
}

/// One frame from the vendor event websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbxEvent {
    /// What happened
    pub event_type: PbxEventType,
    /// Entity path, `/callcontrol/{dn}/{entityType}/{entityId}`
    pub entity: String,
    /// Entity body for `Upset`, digits for `DtmfString`, etc.
    #[serde(default)]
    pub attached_data: Option<serde_json::Value>,
}

/// Entity kinds addressable under a DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A registered device
    Devices,
    /// A call leg
    Participants,
}

/// Parsed form of `/callcontrol/{dn}/{entityType}/{entityId}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPath {
    /// The DN segment
    pub dn: String,
    /// Which map the entity lives in
    pub kind: EntityKind,
    /// The entity id segment
    pub id: String,
}

impl EntityPath {
    /// Parse an entity path. Returns `None` for anything that is not
    /// exactly `/callcontrol/{dn}/{devices|participants}/{id}` - the
    /// vendor emits other shapes this bridge does not track.
    pub fn parse(path: &str) -> Option<EntityPath> {
        let mut segments = path.strip_prefix('/')?.split('/');
        if segments.next()? != "callcontrol" {
            return None;
        }
        let dn = segments.next()?;
        let kind = match segments.next()? {
            "devices" => EntityKind::Devices,
            "participants" => EntityKind::Participants,
            _ => return None,
        };
        let id = segments.next()?;
        if dn.is_empty() || id.is_empty() || segments.next().is_some() {
            return None;
        }
        Some(EntityPath {
            dn: dn.to_string(),
            kind,
            id: id.to_string(),
        })
    }
}
