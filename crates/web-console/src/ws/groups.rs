//! Broadcast groups and the push fan-out.
//!
//! Connections are indexed by id and filtered by their bound group on
//! push. The group for a session is `session:{session_id}`; every tab of
//! one operator lands in the same group.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use webcall_session_core::browser::call::BrowserCall;
use webcall_session_core::browser::signal::SignalMessage;
use webcall_session_core::notifier::SessionNotifier;
use webcall_session_core::types::SessionSnapshotResponse;

use super::connection::Connection;
use super::messages::PushMessage;

/// Group id for a session's connections.
pub fn session_group(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// All live connections, indexed by connection id.
pub struct GroupRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl GroupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<Connection>) {
        let mut conns = self.connections.write().await;
        let _ = conns.insert(connection.id.clone(), connection);
    }

    /// Remove a connection by id. Returns how many connections remain in
    /// the group it was bound to, so the caller can detect the last tab
    /// going away.
    pub async fn remove(&self, connection_id: &str) -> usize {
        let mut conns = self.connections.write().await;
        let Some(removed) = conns.remove(connection_id) else {
            return 0;
        };
        let Some(group) = removed.group() else {
            return 0;
        };
        conns
            .values()
            .filter(|c| c.group().as_deref() == Some(group.as_str()))
            .count()
    }

    /// Push a message to every connection in a group.
    pub async fn push_to_group(&self, group: &str, message: &PushMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize push");
                return;
            }
        };
        let conns = self.connections.read().await;
        for conn in conns.values() {
            if conn.group().as_deref() == Some(group) && !conn.send(json.clone()) {
                tracing::warn!(conn_id = %conn.id, group, "dropped push to slow connection");
            }
        }
    }

    /// Number of connections in a group.
    pub async fn group_size(&self, group: &str) -> usize {
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|c| c.group().as_deref() == Some(group))
            .count()
    }

    /// Total number of connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts the core's push seam onto the group registry.
pub struct GroupNotifier {
    groups: Arc<GroupRegistry>,
}

impl GroupNotifier {
    /// Create a notifier pushing through `groups`.
    pub fn new(groups: Arc<GroupRegistry>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl SessionNotifier for GroupNotifier {
    async fn push_snapshot(&self, session_id: &str, snapshot: SessionSnapshotResponse) {
        self.groups
            .push_to_group(
                &session_group(session_id),
                &PushMessage::SessionSnapshot(snapshot),
            )
            .await;
    }

    async fn push_event(&self, session_id: &str, event_type: &str, payload: serde_json::Value) {
        self.groups
            .push_to_group(
                &session_group(session_id),
                &PushMessage::Event {
                    event_type: event_type.to_string(),
                    occurred_at_utc: chrono::Utc::now(),
                    payload,
                },
            )
            .await;
    }

    async fn push_browser_call(&self, session_id: &str, call: &BrowserCall) {
        self.groups
            .push_to_group(
                &session_group(session_id),
                &PushMessage::BrowserCallUpdated(call.clone()),
            )
            .await;
    }

    async fn push_signal(&self, session_id: &str, message: &SignalMessage) {
        self.groups
            .push_to_group(
                &session_group(session_id),
                &PushMessage::WebRtcSignal(message.clone()),
            )
            .await;
    }
}
