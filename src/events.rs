//! Lifecycle event log
//!
//! Appends one JSON line per cluster lifecycle action (up, down, node
//! kill) to a log under the user state directory. Best-effort: failures
//! are logged at debug and never interrupt the primary workflow.

use chrono::Utc;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Append-only JSON-lines record of lifecycle actions
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Event log under the drover state directory
    pub fn new() -> Self {
        Self {
            path: crate::config::state_dir().join("events.log"),
        }
    }

    /// Event log at an explicit path
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// Record one event; failures are swallowed
    pub async fn record(&self, event: &str, data: &serde_json::Value) {
        let entry = serde_json::json!({
            "id": Uuid::new_v4().to_string(),
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                debug!("Failed to serialize event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            debug!("Failed to write event log: {}", e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
