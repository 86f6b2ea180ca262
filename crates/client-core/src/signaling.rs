//! Outbound seam to the console server.
//!
//! The hosting application owns the realtime connection; the controller
//! only needs these three calls on it.

use async_trait::async_trait;

use webcall_session_core::browser::signal::SignalMessage;

use crate::error::ClientResult;

/// The server-bound operations the controller drives.
#[async_trait]
pub trait ConsoleClient: Send + Sync {
    /// Send a signaling message for relay to the opposite party.
    async fn send_signal(&self, message: SignalMessage) -> ClientResult<()>;

    /// Report that this party's transport reached `connected`.
    async fn mark_connected(&self, call_id: &str) -> ClientResult<()>;

    /// Ask the server to end a call, e.g. after a transport failure.
    async fn end_call(&self, call_id: &str) -> ClientResult<()>;
}
