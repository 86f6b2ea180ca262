//! REST endpoint handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use serde::Serialize;

use webcall_session_core::session::Session;
use webcall_session_core::types::SessionSnapshotResponse;

use crate::auth::Principal;
use crate::error::ApiError;
use crate::state::AppState;

use super::extract::require_input;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Bearer token for subsequent requests and the realtime channel
    pub token: String,
    /// Echoed username
    pub username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OkResponse {
    pub success: bool,
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

async fn session_for(state: &AppState, principal: &Principal) -> Result<Arc<Session>, ApiError> {
    state
        .registry
        .get_or_create(&principal.session_id, &principal.username)
        .await
        .map_err(ApiError::from)
}

/// `POST /auth/login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LoginResponse>, ApiError> {
    let ct = content_type(&headers);
    let username = require_input("username", &query, ct, &body)?;
    let password = require_input("password", &query, ct, &body)?;

    state.credentials.validate(&username, &password).await?;
    let (token, session_id) = state.auth.issue(&username)?;

    // Establish the session eagerly so the first snapshot is warm. A PBX
    // outage must not block login; the realtime connect retries.
    if let Err(e) = state.registry.get_or_create(&session_id, &username).await {
        tracing::warn!(session_id, error = %e, "session attach deferred to first connection");
    }

    Ok(Json(LoginResponse { token, username }))
}

/// `POST /auth/logout` - tears the PBX connection down and destroys the
/// session.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .orchestrator
        .handle_session_disconnected(&principal.session_id)
        .await;
    state.registry.remove(&principal.session_id).await;
    Ok(Json(OkResponse { success: true }))
}

/// `GET /session`
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<SessionSnapshotResponse>, ApiError> {
    let session = session_for(&state, &principal).await?;
    Ok(Json(session.snapshot().await))
}

/// `POST /extensions/select`
pub async fn select_extension(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionSnapshotResponse>, ApiError> {
    let extension = require_input("extension", &query, content_type(&headers), &body)?;
    let session = session_for(&state, &principal).await?;
    let snapshot = state.actions.select_extension(&session, &extension).await?;
    Ok(Json(snapshot))
}

/// `POST /devices/active`
pub async fn set_active_device(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionSnapshotResponse>, ApiError> {
    let device_id = require_input("deviceId", &query, content_type(&headers), &body)?;
    let session = session_for(&state, &principal).await?;
    let snapshot = state.actions.set_active_device(&session, &device_id).await?;
    Ok(Json(snapshot))
}

/// `POST /calls/outgoing`
pub async fn place_outgoing_call(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionSnapshotResponse>, ApiError> {
    let destination = require_input("destination", &query, content_type(&headers), &body)?;
    let session = session_for(&state, &principal).await?;
    let snapshot = state.actions.place_call(&session, &destination).await?;
    Ok(Json(snapshot))
}

/// `POST /calls/{id}/answer`
pub async fn answer_call(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(participant_id): Path<String>,
) -> Result<Json<SessionSnapshotResponse>, ApiError> {
    let session = session_for(&state, &principal).await?;
    let snapshot = state.actions.answer(&session, &participant_id).await?;
    Ok(Json(snapshot))
}

/// `POST /calls/{id}/reject`
pub async fn reject_call(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(participant_id): Path<String>,
) -> Result<Json<SessionSnapshotResponse>, ApiError> {
    let session = session_for(&state, &principal).await?;
    let snapshot = state.actions.reject(&session, &participant_id).await?;
    Ok(Json(snapshot))
}

/// `POST /calls/{id}/end`
pub async fn end_call(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(participant_id): Path<String>,
) -> Result<Json<SessionSnapshotResponse>, ApiError> {
    let session = session_for(&state, &principal).await?;
    let snapshot = state.actions.end(&session, &participant_id).await?;
    Ok(Json(snapshot))
}

/// `POST /calls/{id}/transfer`
pub async fn transfer_call(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(participant_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionSnapshotResponse>, ApiError> {
    let destination = require_input("destination", &query, content_type(&headers), &body)?;
    let session = session_for(&state, &principal).await?;
    let snapshot = state
        .actions
        .transfer(&session, &participant_id, &destination)
        .await?;
    Ok(Json(snapshot))
}
