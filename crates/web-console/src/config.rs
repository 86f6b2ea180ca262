//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use webcall_session_core::pbx::client::PbxConfig;

/// Configuration for the console server.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
    /// HMAC secret for bearer tokens
    pub jwt_secret: String,
    /// Lifetime of issued tokens
    pub token_ttl: Duration,
    /// Vendor PBX connection settings
    pub pbx: PbxConfig,
    /// Whether sessions attach a PBX connection at all; disable for
    /// browser-only deployments
    pub pbx_enabled: bool,
    /// Where call detail records are appended; logs them when unset
    pub cdr_path: Option<PathBuf>,
    /// How long ended browser calls are retained for reconciliation
    pub ended_call_retention: Duration,
    /// How often ended browser calls are pruned
    pub prune_interval: Duration,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().expect("static addr"),
            jwt_secret: String::new(),
            token_ttl: Duration::from_secs(12 * 60 * 60),
            pbx: PbxConfig::default(),
            pbx_enabled: true,
            cdr_path: None,
            ended_call_retention: Duration::from_secs(30),
            prune_interval: Duration::from_secs(10),
        }
    }
}

impl ConsoleConfig {
    /// Set the bind address
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the token secret
    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = secret.into();
        self
    }

    /// Set the PBX connection settings
    pub fn with_pbx(mut self, pbx: PbxConfig) -> Self {
        self.pbx = pbx;
        self
    }

    /// Run without a PBX; sessions carry browser calls only
    pub fn without_pbx(mut self) -> Self {
        self.pbx_enabled = false;
        self
    }

    /// Append call detail records to a JSON-lines file
    pub fn with_cdr_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cdr_path = Some(path.into());
        self
    }

    /// Read settings from `WEBCALL_*` / `PBX_*` environment variables,
    /// starting from the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("WEBCALL_BIND") {
            if let Ok(addr) = addr.parse() {
                config.bind_addr = addr;
            }
        }
        if let Ok(secret) = std::env::var("WEBCALL_JWT_SECRET") {
            config.jwt_secret = secret;
        }
        if let Ok(path) = std::env::var("WEBCALL_CDR_PATH") {
            config.cdr_path = Some(path.into());
        }
        if let Ok(base) = std::env::var("PBX_BASE_URL") {
            config.pbx.base_url = base;
        }
        if let Ok(token) = std::env::var("PBX_TOKEN") {
            config.pbx.token = token;
        }
        if std::env::var("PBX_BASE_URL").is_err() {
            config.pbx_enabled = false;
        }
        config
    }
}
