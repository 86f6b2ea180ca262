//! Push seam between the core and whatever realtime transport hosts it.
//!
//! The core never talks to a websocket directly; it hands finished payloads
//! to a [`SessionNotifier`] keyed by session id. The transport fans each
//! push out to every connection bound to that session's group. Pushes are
//! best-effort: a session with no connected clients is not an error.

use async_trait::async_trait;

use crate::browser::call::BrowserCall;
use crate::browser::signal::SignalMessage;
use crate::types::SessionSnapshotResponse;

/// Outbound push surface consumed by the core.
#[async_trait]
pub trait SessionNotifier: Send + Sync {
    /// Push a fresh session snapshot to the session's group.
    async fn push_snapshot(&self, session_id: &str, snapshot: SessionSnapshotResponse);

    /// Push a non-topology PBX event (DTMF, prompt playback) to the group.
    async fn push_event(&self, session_id: &str, event_type: &str, payload: serde_json::Value);

    /// Push a browser call create/update to the group.
    async fn push_browser_call(&self, session_id: &str, call: &BrowserCall);

    /// Relay a WebRTC signal to the group, unmodified.
    async fn push_signal(&self, session_id: &str, message: &SignalMessage);
}

/// Notifier that drops every push. Useful when running the core headless.
pub struct NullNotifier;

#[async_trait]
impl SessionNotifier for NullNotifier {
    async fn push_snapshot(&self, _session_id: &str, _snapshot: SessionSnapshotResponse) {}

    async fn push_event(&self, _session_id: &str, _event_type: &str, _payload: serde_json::Value) {}

    async fn push_browser_call(&self, _session_id: &str, _call: &BrowserCall) {}

    async fn push_signal(&self, _session_id: &str, _message: &SignalMessage) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// A pushed item captured by [`RecordingNotifier`].
    #[derive(Debug, Clone)]
    pub enum Pushed {
        Snapshot(String, SessionSnapshotResponse),
        Event(String, String, serde_json::Value),
        BrowserCall(String, BrowserCall),
        Signal(String, SignalMessage),
    }

    /// Notifier that records every push for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub pushed: Mutex<Vec<Pushed>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn browser_calls_for(&self, session_id: &str) -> Vec<BrowserCall> {
            self.pushed
                .lock()
                .iter()
                .filter_map(|p| match p {
                    Pushed::BrowserCall(sid, call) if sid == session_id => Some(call.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn signals_for(&self, session_id: &str) -> Vec<SignalMessage> {
            self.pushed
                .lock()
                .iter()
                .filter_map(|p| match p {
                    Pushed::Signal(sid, msg) if sid == session_id => Some(msg.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn snapshot_count(&self) -> usize {
            self.pushed
                .lock()
                .iter()
                .filter(|p| matches!(p, Pushed::Snapshot(..)))
                .count()
        }
    }

    #[async_trait]
    impl SessionNotifier for RecordingNotifier {
        async fn push_snapshot(&self, session_id: &str, snapshot: SessionSnapshotResponse) {
            self.pushed
                .lock()
                .push(Pushed::Snapshot(session_id.to_string(), snapshot));
        }

        async fn push_event(
            &self,
            session_id: &str,
            event_type: &str,
            payload: serde_json::Value,
        ) {
            self.pushed.lock().push(Pushed::Event(
                session_id.to_string(),
                event_type.to_string(),
                payload,
            ));
        }

        async fn push_browser_call(&self, session_id: &str, call: &BrowserCall) {
            self.pushed
                .lock()
                .push(Pushed::BrowserCall(session_id.to_string(), call.clone()));
        }

        async fn push_signal(&self, session_id: &str, message: &SignalMessage) {
            self.pushed
                .lock()
                .push(Pushed::Signal(session_id.to_string(), message.clone()));
        }
    }
}
