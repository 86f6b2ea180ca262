//! Shared state handed to every handler.

use std::sync::Arc;

use webcall_session_core::browser::orchestrator::BrowserCallOrchestrator;
use webcall_session_core::pbx::actions::SessionActions;
use webcall_session_core::registry::SessionRegistry;

use crate::auth::{CredentialValidator, JwtAuthenticator};
use crate::ws::groups::GroupRegistry;

/// Everything the web surface needs, wired once at startup.
pub struct AppState {
    /// Session store
    pub registry: Arc<SessionRegistry>,
    /// Browser call state machine and signal relay
    pub orchestrator: Arc<BrowserCallOrchestrator>,
    /// PBX call actions
    pub actions: Arc<SessionActions>,
    /// Connection groups for push fan-out
    pub groups: Arc<GroupRegistry>,
    /// Token issue/verify
    pub auth: Arc<JwtAuthenticator>,
    /// External credential store
    pub credentials: Arc<dyn CredentialValidator>,
}
