//! Session store: one [`Session`] per logged-in operator.
//!
//! The registry is an explicit injected object; nothing in the workspace
//! holds ambient static session state. Lookups are lock-free via the
//! sharded map, and the extension index lets the browser call orchestrator
//! find the session that currently owns a destination extension.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::CoreResult;
use crate::session::Session;

/// Seam through which a freshly created session gets its PBX connection.
///
/// The production implementation lives in [`crate::pbx::bridge`]; tests and
/// headless deployments use [`NullConnector`].
#[async_trait]
pub trait PbxConnector: Send + Sync {
    /// Open the vendor connection for `session`, pull the initial topology
    /// and start the event stream task.
    async fn attach(&self, session: &Arc<Session>) -> CoreResult<()>;
}

/// Connector that attaches nothing. The session works for browser calls
/// but has no PBX topology.
pub struct NullConnector;

#[async_trait]
impl PbxConnector for NullConnector {
    async fn attach(&self, _session: &Arc<Session>) -> CoreResult<()> {
        Ok(())
    }
}

/// Process-wide session store.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    by_extension: DashMap<String, String>,
    connector: Arc<dyn PbxConnector>,
}

impl SessionRegistry {
    /// Create a registry with the given PBX connector.
    pub fn new(connector: Arc<dyn PbxConnector>) -> Self {
        Self {
            sessions: DashMap::new(),
            by_extension: DashMap::new(),
            connector,
        }
    }

    /// Get the session for `session_id`, creating and attaching it on first
    /// use. Idempotent: concurrent callers converge on one session and one
    /// attach attempt.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        username: &str,
    ) -> CoreResult<Arc<Session>> {
        let session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Session::new(session_id, username)))
            .clone();

        if let Err(e) = session
            .ensure_attached(|| self.connector.attach(&session))
            .await
        {
            // Leave no half-created session behind; the next call retries.
            self.sessions
                .remove_if(session_id, |_, s| Arc::ptr_eq(s, &session));
            return Err(e);
        }

        Ok(session)
    }

    /// Look up an existing session.
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Destroy a session: logout path. Disposes the PBX connection and
    /// clears the extension index.
    pub async fn remove(&self, session_id: &str) {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return;
        };

        if let Some(connection) = session.detach_pbx() {
            if let Some(task) = connection.events_task {
                task.abort();
            }
        }

        self.by_extension.retain(|_, sid| sid != session_id);
        tracing::info!(session_id, "session removed");
    }

    /// Session that currently owns `extension`, if any.
    pub fn find_by_extension(&self, extension: &str) -> Option<Arc<Session>> {
        let session_id = self.by_extension.get(extension).map(|e| e.clone())?;
        self.get(&session_id)
    }

    /// Point the extension index at `session_id`. Any previous extension
    /// entries for the same session are dropped first, so re-selection
    /// moves the session rather than duplicating it.
    pub fn index_extension(&self, session_id: &str, extension: &str) {
        self.by_extension.retain(|_, sid| sid != session_id);
        self.by_extension
            .insert(extension.to_string(), session_id.to_string());
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
