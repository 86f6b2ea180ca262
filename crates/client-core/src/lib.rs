//! Client-side call media handling for the webcall console.
//!
//! The server relays signaling verbatim; everything that actually
//! negotiates media lives here:
//!
//! - [`controller::CallMediaController`] - one peer connection per call
//!   id, with the pending-ICE queue and pending-offer cache that make
//!   out-of-order signal delivery safe on a single-threaded consumer.
//! - [`peer`] - the seam over the native peer connection, implemented on
//!   the `webrtc` crate, faked in tests.
//! - [`media`] - audio sources; switching devices replaces the outbound
//!   track on live senders without renegotiating.
//!
//! Signals arrive carrying the *remote* leg's call id. The controller
//! resolves them to the local leg through the source extension before
//! touching per-call state, then applies them strictly in order.

pub mod controller;
pub mod error;
pub mod events;
pub mod media;
pub mod peer;
pub mod signaling;

pub use controller::CallMediaController;
pub use error::{ClientError, ClientResult};
pub use events::ClientEventHandler;
pub use media::{MediaSource, SilentAudioSource};
pub use peer::{IceCandidate, PeerEvent, PeerEventKind, PeerFactory, PeerTransport, TransportState};
pub use signaling::ConsoleClient;
