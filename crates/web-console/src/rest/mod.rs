//! One-shot REST wrappers over the session core.
//!
//! Everything the realtime surface can do to the PBX side, minus the push
//! channel. Browser calls and signaling are realtime-only.

pub mod extract;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

/// The REST route table.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/session", get(handlers::get_session))
        .route("/extensions/select", post(handlers::select_extension))
        .route("/devices/active", post(handlers::set_active_device))
        .route("/calls/outgoing", post(handlers::place_outgoing_call))
        .route("/calls/{id}/answer", post(handlers::answer_call))
        .route("/calls/{id}/reject", post(handlers::reject_call))
        .route("/calls/{id}/end", post(handlers::end_call))
        .route("/calls/{id}/transfer", post(handlers::transfer_call))
}
