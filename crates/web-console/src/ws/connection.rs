//! One physical websocket connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A connected client, bound to at most one broadcast group.
pub struct Connection {
    /// Unique connection id
    pub id: String,
    /// Bound group, set right after authentication
    group: Mutex<Option<String>>,
    /// Send channel to the connection's writer task
    tx: mpsc::Sender<Arc<String>>,
    /// Messages dropped because the channel was full or closed
    dropped: AtomicU64,
}

impl Connection {
    /// Create a connection around its writer channel.
    pub fn new(id: impl Into<String>, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: id.into(),
            group: Mutex::new(None),
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Bind this connection to a broadcast group.
    pub fn bind_group(&self, group: impl Into<String>) {
        *self.group.lock() = Some(group.into());
    }

    /// The bound group, if any.
    pub fn group(&self) -> Option<String> {
        self.group.lock().clone()
    }

    /// Queue a frame for the writer task.
    ///
    /// A slow consumer loses frames rather than blocking the group; the
    /// drop is counted and logged by the caller.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a value and queue it.
    pub fn send_json<T: serde::Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                tracing::warn!(conn_id = %self.id, error = %e, "failed to serialize frame");
                false
            }
        }
    }

    /// Frames dropped so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (Connection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        (Connection::new("c1", tx), rx)
    }

    #[tokio::test]
    async fn send_delivers_to_writer() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send(Arc::new("hello".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn full_channel_drops_and_counts() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new("c1", tx);
        assert!(conn.send(Arc::new("first".into())));
        assert!(!conn.send(Arc::new("second".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn closed_channel_drops() {
        let (tx, rx) = mpsc::channel(8);
        let conn = Connection::new("c1", tx);
        drop(rx);
        assert!(!conn.send(Arc::new("late".into())));
    }

    #[test]
    fn group_binding() {
        let (conn, _rx) = make_connection();
        assert!(conn.group().is_none());
        conn.bind_group("session:s1");
        assert_eq!(conn.group().as_deref(), Some("session:s1"));
    }

    #[tokio::test]
    async fn send_json_serializes() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send_json(&serde_json::json!({"ok": true})));
        let frame = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["ok"], true);
    }
}
