//! Error types for the client-side controller.

use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised while driving calls from the client side
#[derive(Debug, Error)]
pub enum ClientError {
    /// Signaling send failed
    #[error("Signaling error: {message}")]
    Signaling { message: String },

    /// Media capture or track handling failed
    #[error("Media error: {message}")]
    Media { message: String },

    /// The native peer connection reported an error
    #[error("WebRTC error: {message}")]
    WebRtc { message: String },

    /// Call not found
    #[error("Call not found: {call_id}")]
    CallNotFound { call_id: String },

    /// Operation does not apply in the call's current state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    /// Create a signaling error
    pub fn signaling(message: impl Into<String>) -> Self {
        Self::Signaling {
            message: message.into(),
        }
    }

    /// Create a media error
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a call-not-found error
    pub fn call_not_found(call_id: impl Into<String>) -> Self {
        Self::CallNotFound {
            call_id: call_id.into(),
        }
    }
}

impl From<webrtc::Error> for ClientError {
    fn from(e: webrtc::Error) -> Self {
        Self::WebRtc {
            message: e.to_string(),
        }
    }
}
