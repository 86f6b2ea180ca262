//! Call detail records and the sink they leave through.
//!
//! The core produces one record per ended call leg - browser-native and
//! PBX-side alike - and hands it to the injected [`CdrSink`]. Durable
//! storage is owned elsewhere; sink failures are logged and never propagate
//! into call handling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

/// Which side of the system produced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CdrKind {
    /// Browser-native WebRTC call leg
    Browser,
    /// PBX call leg
    Pbx,
}

/// One finished call leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDetailRecord {
    /// Call or participant id the record belongs to
    pub call_id: String,
    /// Producing side
    pub kind: CdrKind,
    /// Local party
    pub from_extension: String,
    /// Remote party
    pub to_extension: String,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
    /// When the call was answered, if it was
    pub answered_at: Option<DateTime<Utc>>,
    /// When the leg ended
    pub ended_at: DateTime<Utc>,
    /// Why the leg ended, if known
    pub end_reason: Option<String>,
}

/// Durable record sink the core writes to but does not own.
#[async_trait]
pub trait CdrSink: Send + Sync {
    /// Persist one record. Implementations must swallow their own failures.
    async fn write(&self, record: &CallDetailRecord);
}

/// Sink that emits each record as a structured log line.
pub struct TracingCdrSink;

#[async_trait]
impl CdrSink for TracingCdrSink {
    async fn write(&self, record: &CallDetailRecord) {
        tracing::info!(
            call_id = %record.call_id,
            kind = ?record.kind,
            from = %record.from_extension,
            to = %record.to_extension,
            end_reason = record.end_reason.as_deref().unwrap_or(""),
            "call detail record"
        );
    }
}

/// Sink that appends records as JSON lines to a file.
pub struct JsonlCdrSink {
    path: std::path::PathBuf,
    file: tokio::sync::Mutex<Option<tokio::fs::File>>,
}

impl JsonlCdrSink {
    /// Create a sink appending to `path`. The file is opened on first write.
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl CdrSink for JsonlCdrSink {
    async fn write(&self, record: &CallDetailRecord) {
        let line = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize call detail record");
                return;
            }
        };

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
            {
                Ok(file) => *guard = Some(file),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to open CDR file");
                    return;
                }
            }
        }

        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(format!("{}\n", line).as_bytes()).await {
                tracing::warn!(error = %e, "failed to append call detail record");
                *guard = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CallDetailRecord {
        CallDetailRecord {
            call_id: "c1".into(),
            kind: CdrKind::Browser,
            from_extension: "100".into(),
            to_extension: "101".into(),
            started_at: Utc::now(),
            answered_at: None,
            ended_at: Utc::now(),
            end_reason: Some("ended".into()),
        }
    }

    #[test]
    fn record_serializes_camel_case() {
        let value = serde_json::to_value(sample_record()).unwrap();
        assert_eq!(value["callId"], "c1");
        assert_eq!(value["kind"], "browser");
        assert_eq!(value["fromExtension"], "100");
        assert_eq!(value["endReason"], "ended");
    }

    #[tokio::test]
    async fn jsonl_sink_appends_lines() {
        let path = std::env::temp_dir().join(format!("cdr-{}.jsonl", uuid::Uuid::new_v4()));
        let sink = JsonlCdrSink::new(&path);
        sink.write(&sample_record()).await;
        sink.write(&sample_record()).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: CallDetailRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.call_id, "c1");
        let _ = tokio::fs::remove_file(&path).await;
    }
}
