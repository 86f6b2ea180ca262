//! Call-session and WebRTC-signaling relay core for the webcall console.
//!
//! This crate owns the server-side telephony state for one deployment:
//!
//! - **Session store** ([`registry::SessionRegistry`]) - one mutable
//!   [`session::Session`] per logged-in operator, guarded by a per-session
//!   exclusive gate so PBX-event handling and user actions never interleave
//!   within one session.
//! - **PBX event bridge** ([`pbx`]) - pulls the vendor call-control topology
//!   into the session, consumes the vendor event stream, and issues
//!   call-control commands on behalf of the operator.
//! - **Browser call orchestrator** ([`browser`]) - an independent state
//!   machine for browser-native WebRTC calls plus the SDP/ICE signal relay
//!   between the two parties of a call.
//!
//! The crate is transport-agnostic: pushes to connected clients go through
//! the [`notifier::SessionNotifier`] seam, and call detail records leave
//! through the [`cdr::CdrSink`] seam. The realtime/REST surface lives in
//! `webcall-web-console`; the client-side peer-connection controller lives
//! in `webcall-client-core`.
//!
//! # Concurrency model
//!
//! Mutations to one session are totally ordered by the session gate
//! (a `tokio::sync::Mutex` around the session state). Mutations across
//! different sessions interleave freely; sessions never share mutable maps.
//! Browser calls live in a process-wide concurrent map where a status
//! transition is applied atomically per entry, so racing transitions
//! resolve to whichever committed first and the loser no-ops.

pub mod browser;
pub mod cdr;
pub mod errors;
pub mod notifier;
pub mod pbx;
pub mod registry;
pub mod session;
pub mod types;

pub use browser::call::{BrowserCall, BrowserCallStatus};
pub use browser::orchestrator::BrowserCallOrchestrator;
pub use browser::signal::{SignalBody, SignalMessage};
pub use cdr::{CallDetailRecord, CdrKind, CdrSink};
pub use errors::{CoreError, CoreResult};
pub use notifier::SessionNotifier;
pub use pbx::client::{CallControlApi, PbxClient, PbxConfig};
pub use registry::SessionRegistry;
pub use session::{Session, SessionState};
pub use types::{DeviceInfo, DnInfo, Participant, SessionSnapshotResponse};
