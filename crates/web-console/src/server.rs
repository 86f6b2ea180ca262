//! Wires the core together and serves both surfaces.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use webcall_session_core::browser::orchestrator::BrowserCallOrchestrator;
use webcall_session_core::cdr::{CdrSink, JsonlCdrSink, TracingCdrSink};
use webcall_session_core::notifier::SessionNotifier;
use webcall_session_core::pbx::actions::SessionActions;
use webcall_session_core::pbx::bridge::PbxBridge;
use webcall_session_core::registry::{NullConnector, PbxConnector, SessionRegistry};

use crate::auth::{AnyCredentials, CredentialValidator, JwtAuthenticator};
use crate::config::ConsoleConfig;
use crate::rest;
use crate::state::AppState;
use crate::ws::groups::{GroupNotifier, GroupRegistry};
use crate::ws::handler::ws_handler;

/// The assembled console server.
pub struct ConsoleServer {
    config: ConsoleConfig,
    state: Arc<AppState>,
}

impl ConsoleServer {
    /// Wire the core for `config` with an injected credential store.
    pub fn new(config: ConsoleConfig, credentials: Arc<dyn CredentialValidator>) -> Self {
        let groups = Arc::new(GroupRegistry::new());
        let notifier: Arc<dyn SessionNotifier> = Arc::new(GroupNotifier::new(groups.clone()));

        let cdr: Arc<dyn CdrSink> = match &config.cdr_path {
            Some(path) => Arc::new(JsonlCdrSink::new(path)),
            None => Arc::new(TracingCdrSink),
        };

        let connector: Arc<dyn PbxConnector> = if config.pbx_enabled {
            PbxBridge::new(config.pbx.clone(), notifier.clone(), cdr.clone())
        } else {
            Arc::new(NullConnector)
        };
        let registry = Arc::new(SessionRegistry::new(connector));

        let orchestrator = Arc::new(
            BrowserCallOrchestrator::new(registry.clone(), notifier.clone(), cdr)
                .with_ended_retention(config.ended_call_retention),
        );
        let actions = Arc::new(SessionActions::new(registry.clone(), notifier));
        let auth = Arc::new(JwtAuthenticator::new(
            config.jwt_secret.as_bytes(),
            config.token_ttl,
        ));

        let state = Arc::new(AppState {
            registry,
            orchestrator,
            actions,
            groups,
            auth,
            credentials,
        });

        Self { config, state }
    }

    /// Wire the core with the permissive demo credential store.
    pub fn with_defaults(config: ConsoleConfig) -> Self {
        Self::new(config, Arc::new(AnyCredentials))
    }

    /// The shared state, for embedding the surfaces elsewhere.
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the full route table.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .merge(rest::router())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Serve until the process is stopped.
    pub async fn serve(self) -> anyhow::Result<()> {
        if self.config.jwt_secret.is_empty() {
            anyhow::bail!("refusing to start without a JWT secret");
        }

        let orchestrator = self.state.orchestrator.clone();
        let prune_interval = self.config.prune_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(prune_interval);
            loop {
                ticker.tick().await;
                orchestrator.prune_ended();
            }
        });

        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "console server listening");
        axum::serve(listener, router).await?;
        Ok(())
    }
}
