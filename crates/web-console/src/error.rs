//! Maps the core error taxonomy onto the two client surfaces.
//!
//! REST gets an HTTP status plus a structured body; the realtime layer
//! gets a fault string. Internal errors are logged with their trace id and
//! reduced to a generic message so no detail leaks.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

use webcall_session_core::errors::CoreError;

/// A core error on its way out to a REST client.
#[derive(Debug)]
pub struct ApiError {
    /// The classified error
    pub error: CoreError,
    /// Correlates the client-visible failure with server logs
    pub trace_id: String,
}

/// Structured REST error body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Taxonomy name, e.g. `NotFound`
    pub name: &'static str,
    /// Human-readable message; generic for internal errors
    pub message: String,
    /// Stable machine-readable code
    pub error_code: &'static str,
    /// Correlation id
    pub trace_id: String,
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        Self {
            error,
            trace_id: Uuid::new_v4().to_string(),
        }
    }
}

/// HTTP status for a classified error.
pub fn status_for(error: &CoreError) -> StatusCode {
    match error {
        CoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
        CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::UpstreamApi { .. } => StatusCode::BAD_GATEWAY,
        CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Taxonomy name for a classified error.
pub fn name_for(error: &CoreError) -> &'static str {
    match error {
        CoreError::BadRequest(_) => "BadRequest",
        CoreError::Unauthorized(_) => "Unauthorized",
        CoreError::Forbidden(_) => "Forbidden",
        CoreError::NotFound(_) => "NotFound",
        CoreError::UpstreamApi { .. } => "UpstreamApiError",
        CoreError::Internal(_) => "InternalServerError",
    }
}

/// Client-visible message for a classified error. Internal detail stays in
/// the logs.
pub fn public_message(error: &CoreError) -> String {
    match error {
        CoreError::Internal(_) => "internal server error".to_string(),
        other => other.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let CoreError::Internal(detail) = &self.error {
            tracing::error!(trace_id = %self.trace_id, detail, "internal error");
        }

        let body = ErrorBody {
            name: name_for(&self.error),
            message: public_message(&self.error),
            error_code: self.error.error_code(),
            trace_id: self.trace_id,
        };
        (status_for(&self.error), Json(body)).into_response()
    }
}
