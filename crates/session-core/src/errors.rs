//! Error taxonomy shared by every operation in the core.
//!
//! The variants map one-to-one onto the client-visible fault taxonomy:
//! the REST layer turns them into HTTP statuses, the realtime layer into
//! fault strings. Anything that is not one of these is an unclassified
//! internal error and must not leak detail to clients.

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by session, PBX and browser-call operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or missing input (e.g. empty destination extension)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid session principal
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Action on a participant or DN not owned by the session
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown participant, call or extension
    #[error("Not found: {0}")]
    NotFound(String),

    /// The vendor PBX returned a failure status
    #[error("Upstream PBX error ({status}): {message}")]
    UpstreamApi { status: u16, message: String },

    /// Unclassified internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Create a bad-request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        CoreError::BadRequest(message.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        CoreError::Unauthorized(message.into())
    }

    /// Create a forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        CoreError::Forbidden(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    /// Create an upstream PBX error carrying the vendor status code
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        CoreError::UpstreamApi {
            status,
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        CoreError::Internal(message.into())
    }

    /// Stable machine-readable code for the client-visible fault
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::BadRequest(_) => "BAD_REQUEST",
            CoreError::Unauthorized(_) => "UNAUTHORIZED",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::UpstreamApi { .. } => "UPSTREAM_API_ERROR",
            CoreError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(CoreError::bad_request("x").error_code(), "BAD_REQUEST");
        assert_eq!(CoreError::not_found("x").error_code(), "NOT_FOUND");
        assert_eq!(
            CoreError::upstream(503, "busy").error_code(),
            "UPSTREAM_API_ERROR"
        );
    }

    #[test]
    fn upstream_display_includes_status() {
        let err = CoreError::upstream(487, "request terminated");
        assert_eq!(
            err.to_string(),
            "Upstream PBX error (487): request terminated"
        );
    }
}
