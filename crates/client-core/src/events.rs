//! Event handling for the client-side controller.
//!
//! The hosting application implements [`ClientEventHandler`] to drive its
//! UI; every method has a default no-op so hosts only override what they
//! render.

use async_trait::async_trait;

use webcall_session_core::browser::call::BrowserCall;

/// Callbacks emitted by the call media controller.
#[async_trait]
pub trait ClientEventHandler: Send + Sync {
    /// A fresh inbound call is ringing and awaits an answer decision.
    async fn on_incoming_call(&self, _call: &BrowserCall) {}

    /// A known call changed state.
    async fn on_call_updated(&self, _call: &BrowserCall) {}

    /// The peer transport for a call came up.
    async fn on_transport_connected(&self, _call_id: &str) {}

    /// The peer transport for a call failed; the call is being ended.
    async fn on_transport_failed(&self, _call_id: &str) {}

    /// A call reached its terminal state.
    async fn on_call_ended(&self, _call_id: &str, _reason: Option<&str>) {}

    /// The last peer connection is gone; release the remote audio sink.
    async fn on_remote_audio_cleared(&self) {}
}

/// Handler that ignores every event.
pub struct NullEventHandler;

#[async_trait]
impl ClientEventHandler for NullEventHandler {}
