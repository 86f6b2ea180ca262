//! Websocket upgrade, socket lifecycle and RPC dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use webcall_session_core::browser::signal::SignalMessage;
use webcall_session_core::errors::{CoreError, CoreResult};
use webcall_session_core::session::Session;

use crate::auth::{Principal, bearer_token};
use crate::error::ApiError;
use crate::state::AppState;

use super::connection::Connection;
use super::groups::session_group;
use super::messages::{CallIdParams, PlaceCallParams, PushMessage, RpcRequest, RpcResponse};

/// `GET /ws` - authenticate, then upgrade.
///
/// The token comes from the Authorization header or, for browser
/// `WebSocket` clients that cannot set headers, the `access_token` query
/// parameter.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
        .or_else(|| query.get("access_token").cloned());

    let principal = match token.as_deref().map(|t| state.auth.verify(t)) {
        Some(Ok(principal)) => principal,
        _ => {
            return ApiError::from(CoreError::unauthorized("missing or invalid token"))
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, principal, socket))
}

async fn handle_socket(state: Arc<AppState>, principal: Principal, socket: WebSocket) {
    let session = match state
        .registry
        .get_or_create(&principal.session_id, &principal.username)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(
                session_id = %principal.session_id,
                error = %e,
                "failed to establish session"
            );
            return;
        }
    };

    // Make the session reachable for incoming browser calls.
    let snapshot = session.snapshot().await;
    if let Some(extension) = &snapshot.selected_extension {
        state
            .registry
            .index_extension(&session.session_id, extension);
    }

    let group = session_group(&session.session_id);
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(64);
    let connection = Arc::new(Connection::new(Uuid::new_v4().to_string(), tx));
    connection.bind_group(group.clone());
    state.groups.add(connection.clone()).await;

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text((*frame).clone().into())).await.is_err() {
                break;
            }
        }
    });

    // Seed the new connection only; other tabs keep their state.
    connection.send_json(&PushMessage::SessionSnapshot(snapshot));
    connection.send_json(&PushMessage::BrowserCallsSnapshot(
        state.orchestrator.calls_for_session(&session.session_id),
    ));

    tracing::info!(
        conn_id = %connection.id,
        session_id = %session.session_id,
        "realtime connection bound"
    );

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let request: RpcRequest = match serde_json::from_str(&text) {
                    Ok(request) => request,
                    Err(e) => {
                        connection.send_json(&RpcResponse::fault(
                            0,
                            &CoreError::bad_request(format!("malformed request frame: {}", e)),
                        ));
                        continue;
                    }
                };

                match dispatch(&state, &session, request).await {
                    Ok(response) => {
                        connection.send_json(&response);
                    }
                    Err(e) => {
                        // A session whose internals misbehaved is not safe
                        // to keep serving on this connection.
                        tracing::error!(
                            conn_id = %connection.id,
                            session_id = %session.session_id,
                            error = %e,
                            "connection-fatal error"
                        );
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    let remaining = state.groups.remove(&connection.id).await;
    writer.abort();
    tracing::info!(
        conn_id = %connection.id,
        session_id = %session.session_id,
        remaining,
        "realtime connection closed"
    );

    // The session itself survives a refresh; only its browser calls are
    // forced down when the last tab goes away.
    if remaining == 0 {
        state
            .orchestrator
            .handle_session_disconnected(&session.session_id)
            .await;
    }
}

/// Route one RPC to its component call.
///
/// Classified errors become client-visible faults; an internal error is
/// returned as `Err` so the socket loop can fail the connection.
pub(crate) async fn dispatch(
    state: &AppState,
    session: &Arc<Session>,
    request: RpcRequest,
) -> Result<RpcResponse, CoreError> {
    let result = route(state, session, &request).await;
    match result {
        Ok(value) => Ok(RpcResponse::success(request.id, value)),
        Err(CoreError::Internal(detail)) => Err(CoreError::Internal(detail)),
        Err(e) => {
            tracing::debug!(method = %request.method, error = %e, "rpc fault");
            Ok(RpcResponse::fault(request.id, &e))
        }
    }
}

async fn route(
    state: &AppState,
    session: &Arc<Session>,
    request: &RpcRequest,
) -> CoreResult<serde_json::Value> {
    match request.method.as_str() {
        "placeCall" => {
            let params: PlaceCallParams = parse_params(&request.params)?;
            let call = state
                .orchestrator
                .place_call(session, &params.destination_extension)
                .await?;
            to_value(&call)
        }
        "answerCall" => {
            let params: CallIdParams = parse_params(&request.params)?;
            state
                .orchestrator
                .answer_call(session, &params.call_id)
                .await?;
            Ok(serde_json::Value::Null)
        }
        "rejectCall" => {
            let params: CallIdParams = parse_params(&request.params)?;
            state
                .orchestrator
                .reject_call(session, &params.call_id)
                .await?;
            Ok(serde_json::Value::Null)
        }
        "endCall" => {
            let params: CallIdParams = parse_params(&request.params)?;
            state
                .orchestrator
                .end_call(session, &params.call_id)
                .await?;
            Ok(serde_json::Value::Null)
        }
        "markConnected" => {
            let params: CallIdParams = parse_params(&request.params)?;
            state
                .orchestrator
                .mark_connected(session, &params.call_id)
                .await?;
            Ok(serde_json::Value::Null)
        }
        "sendSignal" => {
            let message: SignalMessage = parse_params(&request.params)?;
            state.orchestrator.forward_signal(session, message).await?;
            Ok(serde_json::Value::Null)
        }
        other => Err(CoreError::bad_request(format!("unknown method {}", other))),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: &serde_json::Value) -> CoreResult<T> {
    serde_json::from_value(params.clone())
        .map_err(|e| CoreError::bad_request(format!("invalid parameters: {}", e)))
}

fn to_value<T: serde::Serialize>(value: &T) -> CoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| CoreError::internal(format!("serialize failed: {}", e)))
}
