//! Bridge to the vendor PBX call-control API.
//!
//! Three pieces:
//!
//! - [`client`] - the command surface: topology fetch and per-participant
//!   call-control commands over HTTP, bounded by a request timeout.
//! - [`stream`] - the vendor event websocket, yielding
//!   [`events::PbxEvent`] frames.
//! - [`bridge`] - reconciliation: applies events into session state under
//!   the session gate and pushes a fresh snapshot after every change.
//!
//! User-initiated call actions live in [`actions`]; they validate against
//! the session's owned DNs before issuing any vendor command.

pub mod actions;
pub mod bridge;
pub mod client;
pub mod events;
pub mod stream;

pub use actions::SessionActions;
pub use bridge::PbxBridge;
pub use client::{CallControlApi, DnTopology, PbxClient, PbxConfig};
pub use events::{EntityKind, EntityPath, PbxEvent, PbxEventType};
