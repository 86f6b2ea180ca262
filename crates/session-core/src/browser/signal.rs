//! WebRTC signaling messages.
//!
//! A tagged union discriminated by `type`, validated once at the relay
//! boundary. The relay itself never inspects SDP or candidate content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};

/// Signal payload, discriminated by the wire `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SignalBody {
    /// An SDP offer
    Offer {
        /// The offer SDP blob
        sdp: String,
    },
    /// An SDP answer
    Answer {
        /// The answer SDP blob
        sdp: String,
    },
    /// One ICE candidate
    Ice {
        /// The candidate line
        candidate: String,
        /// Media stream identification tag
        sdp_mid: Option<String>,
        /// Index of the media description the candidate belongs to
        sdp_m_line_index: Option<u16>,
    },
}

/// One signaling message between the two parties of a browser call.
///
/// Transient: never persisted, relayed at most once, no retry. The call id
/// is the sender's leg id; receivers resolve it to their own leg through
/// the source extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    /// The sender's call leg id
    pub call_id: String,
    /// Offer, answer or ICE payload
    #[serde(flatten)]
    pub body: SignalBody,
    /// Sender's extension
    pub from_extension: String,
    /// Intended receiver's extension
    pub to_extension: String,
    /// When the sender produced the message
    pub sent_at_utc: DateTime<Utc>,
}

impl SignalMessage {
    /// Validate the message at the relay boundary.
    ///
    /// Only structural checks: the relay must never fail because of
    /// malformed media descriptions, so SDP content is not inspected.
    pub fn validate(&self) -> CoreResult<()> {
        if self.call_id.trim().is_empty() {
            return Err(CoreError::bad_request("signal is missing a call id"));
        }
        match &self.body {
            SignalBody::Offer { sdp } | SignalBody::Answer { sdp } => {
                if sdp.trim().is_empty() {
                    return Err(CoreError::bad_request("signal is missing its SDP"));
                }
            }
            SignalBody::Ice { candidate, .. } => {
                if candidate.trim().is_empty() {
                    return Err(CoreError::bad_request("signal is missing its candidate"));
                }
            }
        }
        Ok(())
    }
}
