//! The browser call record and its state machine.
//!
//! ```text
//! (none) --place/receive--> Ringing --answer--> Connecting --peer up--> Connected
//!   Ringing --reject--> Ended      Connecting --fail--> Ended
//!   Connected --end--> Ended
//! ```
//!
//! `Ended` is terminal: no later answer, reject or connected report moves
//! the record again. Transition methods return whether they changed
//! anything so racing callers can tell a commit from a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known end reasons.
pub mod end_reason {
    /// Ended by either party after being established
    pub const ENDED: &str = "ended";
    /// Rejected while ringing
    pub const REJECTED: &str = "rejected";
    /// Forced down because a party's last realtime connection dropped
    pub const SESSION_DISCONNECTED: &str = "session-disconnected";
}

/// Lifecycle states of a browser call leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowserCallStatus {
    /// Placed or received, not yet accepted
    Ringing,
    /// Accepted, transport not yet up
    Connecting,
    /// Peer transport established
    Connected,
    /// Terminal
    Ended,
}

/// One party's leg of a browser-native call attempt.
///
/// The two legs of one attempt are correlated by complementary local and
/// remote extensions; each leg is owned by exactly one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserCall {
    /// Opaque call id allocated by the orchestrator
    pub id: String,
    /// Owning session; never sent to clients
    #[serde(skip)]
    pub session_id: String,
    /// Current state
    pub status: BrowserCallStatus,
    /// This party's extension
    pub local_extension: String,
    /// The other party's extension
    pub remote_extension: String,
    /// Display name of the other party, if known
    pub remote_display_name: Option<String>,
    /// Whether this leg was received rather than placed
    pub incoming: bool,
    /// When the leg was created
    pub created_at_utc: DateTime<Utc>,
    /// When the transport first came up
    pub answered_at_utc: Option<DateTime<Utc>>,
    /// When the leg ended
    pub ended_at_utc: Option<DateTime<Utc>>,
    /// Why the leg ended, if it has
    pub end_reason: Option<String>,
}

impl BrowserCall {
    fn new(
        session_id: impl Into<String>,
        local: impl Into<String>,
        remote: impl Into<String>,
        incoming: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            status: BrowserCallStatus::Ringing,
            local_extension: local.into(),
            remote_extension: remote.into(),
            remote_display_name: None,
            incoming,
            created_at_utc: Utc::now(),
            answered_at_utc: None,
            ended_at_utc: None,
            end_reason: None,
        }
    }

    /// The caller's leg of a new attempt.
    pub fn outgoing(
        session_id: impl Into<String>,
        local: impl Into<String>,
        remote: impl Into<String>,
    ) -> Self {
        Self::new(session_id, local, remote, false)
    }

    /// The callee's leg of a new attempt.
    pub fn incoming(
        session_id: impl Into<String>,
        local: impl Into<String>,
        remote: impl Into<String>,
        remote_display_name: Option<String>,
    ) -> Self {
        let mut call = Self::new(session_id, local, remote, true);
        call.remote_display_name = remote_display_name;
        call
    }

    /// Whether the leg has reached its terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status == BrowserCallStatus::Ended
    }

    /// `Ringing` to `Connecting`. Anything else is a no-op.
    pub fn begin_connecting(&mut self) -> bool {
        if self.status == BrowserCallStatus::Ringing {
            self.status = BrowserCallStatus::Connecting;
            true
        } else {
            false
        }
    }

    /// `Ringing` or `Connecting` to `Connected`, stamping the answered
    /// time once. Late or duplicate reports are no-ops.
    pub fn mark_connected(&mut self) -> bool {
        match self.status {
            BrowserCallStatus::Ringing | BrowserCallStatus::Connecting => {
                self.status = BrowserCallStatus::Connected;
                if self.answered_at_utc.is_none() {
                    self.answered_at_utc = Some(Utc::now());
                }
                true
            }
            _ => false,
        }
    }

    /// Any non-terminal state to `Ended` with `reason`.
    pub fn end(&mut self, reason: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = BrowserCallStatus::Ended;
        self.ended_at_utc = Some(Utc::now());
        self.end_reason = Some(reason.to_string());
        true
    }
}
