//! Realtime transport: one websocket per browser tab.
//!
//! Each connection authenticates, binds to its session's broadcast group
//! and receives the current session snapshot and browser call list before
//! anything else - so a second tab joins without disturbing the first.
//! Inbound frames are RPC requests; outbound frames are RPC responses and
//! group pushes.

pub mod connection;
pub mod groups;
pub mod handler;
pub mod messages;

pub use connection::Connection;
pub use groups::{GroupRegistry, session_group};
pub use messages::{PushMessage, RpcFault, RpcRequest, RpcResponse};
