//! Browser-native call handling.
//!
//! Browser calls are independent of PBX participants: the orchestrator
//! runs their state machine and relays SDP/ICE signals between the two
//! parties, while the media itself flows peer-to-peer. The relay is a pure
//! pipe - all negotiation semantics live in the client-side controller.

pub mod call;
pub mod orchestrator;
pub mod signal;

pub use call::{BrowserCall, BrowserCallStatus, end_reason};
pub use orchestrator::BrowserCallOrchestrator;
pub use signal::{SignalBody, SignalMessage};
