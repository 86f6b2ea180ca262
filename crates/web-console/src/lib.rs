//! Web surface for the webcall console.
//!
//! Two ways in, one core:
//!
//! - **Realtime** ([`ws`]) - a websocket per browser tab, bound to the
//!   owning session's broadcast group. RPCs go in, snapshots, call updates
//!   and WebRTC signals come out.
//! - **REST** ([`rest`]) - thin one-shot wrappers over the same session
//!   actions, with no push channel.
//!
//! Authentication happens at this boundary: both surfaces turn a bearer
//! token into a [`auth::Principal`] carrying the stable session id, then
//! hand off to `webcall-session-core`. Token issuance itself is delegated
//! to the injected credential validator.

pub mod auth;
pub mod config;
pub mod error;
pub mod rest;
pub mod server;
pub mod state;
pub mod ws;

pub use auth::{CredentialValidator, JwtAuthenticator, Principal};
pub use config::ConsoleConfig;
pub use error::ApiError;
pub use server::ConsoleServer;
pub use state::AppState;
