//! Runnable console server.
//!
//! ```bash
//! WEBCALL_JWT_SECRET=dev-secret \
//! PBX_BASE_URL=https://pbx.example.com \
//! PBX_TOKEN=... \
//! cargo run --example console_server
//! ```
//!
//! Without `PBX_BASE_URL` the server runs browser-calls-only.

use tracing::Level;
use webcall_infra_common::logging::{LoggingConfig, setup_logging};
use webcall_web_console::{ConsoleConfig, ConsoleServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging(LoggingConfig::new(Level::INFO, "webcall-console"))
        .map_err(|e| anyhow::anyhow!("logging setup failed: {}", e))?;

    let mut config = ConsoleConfig::from_env();
    if config.jwt_secret.is_empty() {
        tracing::warn!("WEBCALL_JWT_SECRET not set; using a development secret");
        config.jwt_secret = "dev-secret-change-me".to_string();
    }

    ConsoleServer::with_defaults(config).serve().await
}
