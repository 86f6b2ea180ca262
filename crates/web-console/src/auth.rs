//! Authentication boundary.
//!
//! Credential checking and user storage are external collaborators; this
//! module only turns a bearer token into a [`Principal`] carrying the
//! stable session id, and issues tokens once the injected
//! [`CredentialValidator`] has accepted a login.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use webcall_session_core::errors::{CoreError, CoreResult};

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller of a request or connection.
#[derive(Debug, Clone)]
pub struct Principal {
    /// Stable session id minted at login; survives reconnects
    pub session_id: String,
    /// Owning username
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    sid: String,
    exp: u64,
}

/// Seam to the external credential store.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// Check a username/password pair, returning `Unauthorized` on
    /// mismatch.
    async fn validate(&self, username: &str, password: &str) -> CoreResult<()>;
}

/// Validator that accepts any non-empty credentials. Demo use only.
pub struct AnyCredentials;

#[async_trait]
impl CredentialValidator for AnyCredentials {
    async fn validate(&self, username: &str, password: &str) -> CoreResult<()> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(CoreError::unauthorized("missing credentials"));
        }
        Ok(())
    }
}

/// Issues and verifies HS256 bearer tokens.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtAuthenticator {
    /// Create an authenticator over a shared secret.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl,
        }
    }

    /// Mint a token for a fresh login. Each login gets its own session id.
    pub fn issue(&self, username: &str) -> CoreResult<(String, String)> {
        let session_id = Uuid::new_v4().to_string();
        let claims = Claims {
            sub: username.to_string(),
            sid: session_id.clone(),
            exp: (chrono::Utc::now()
                + chrono::Duration::from_std(self.ttl)
                    .unwrap_or_else(|_| chrono::Duration::hours(12)))
            .timestamp() as u64,
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| CoreError::internal(format!("failed to sign token: {}", e)))?;
        Ok((token, session_id))
    }

    /// Verify a token and extract its principal.
    pub fn verify(&self, token: &str) -> CoreResult<Principal> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| CoreError::unauthorized("missing or invalid token"))?;
        Ok(Principal {
            session_id: data.claims.sid,
            username: data.claims.sub,
        })
    }
}

/// Pull a bearer token out of an Authorization header value.
pub fn bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<std::sync::Arc<AppState>> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &std::sync::Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError::from(CoreError::unauthorized("missing bearer token")))?;
        state.auth.verify(token).map_err(ApiError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> JwtAuthenticator {
        JwtAuthenticator::new(b"test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn issued_token_verifies() {
        let auth = authenticator();
        let (token, session_id) = auth.issue("alice").unwrap();
        let principal = auth.verify(&token).unwrap();
        assert_eq!(principal.username, "alice");
        assert_eq!(principal.session_id, session_id);
    }

    #[test]
    fn each_login_gets_a_fresh_session() {
        let auth = authenticator();
        let (_, first) = auth.issue("alice").unwrap();
        let (_, second) = auth.issue("alice").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let auth = authenticator();
        let (token, _) = auth.issue("alice").unwrap();
        let other = JwtAuthenticator::new(b"other-secret", Duration::from_secs(3600));
        assert!(other.verify(&token).is_err());
        assert!(auth.verify(&format!("{}x", token)).is_err());
    }

    #[test]
    fn bearer_prefix_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }

    #[tokio::test]
    async fn any_credentials_requires_non_empty() {
        assert!(AnyCredentials.validate("alice", "pw").await.is_ok());
        assert!(AnyCredentials.validate("", "pw").await.is_err());
        assert!(AnyCredentials.validate("alice", "").await.is_err());
    }
}
