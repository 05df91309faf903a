//! Structured sync log streaming.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
}

impl SyncLogEvent {
    pub fn new(level: &str, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.to_string(),
            message: message.to_string(),
            details: None,
            job_id: None,
            repo_id: None,
        }
    }
}

#[derive(Clone)]
pub struct LogBroadcaster {
    sender: broadcast::Sender<SyncLogEvent>,
}

impl LogBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn send(&self, event: SyncLogEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncLogEvent> {
        self.sender.subscribe()
    }

    /// Returns a logger that tags every entry with one job.
    pub fn for_job<'a>(&'a self, job_id: &'a str, repo_id: &'a str) -> JobLogger<'a> {
        JobLogger {
            broadcaster: self,
            job_id,
            repo_id,
        }
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Writes each entry to the `log` facade and to the broadcaster.
pub struct JobLogger<'a> {
    broadcaster: &'a LogBroadcaster,
    job_id: &'a str,
    repo_id: &'a str,
}

impl JobLogger<'_> {
    fn emit(&self, level: log::Level, message: &str, details: Option<serde_json::Value>) {
        log::log!(target: "reposync::sync", level, "[job {}] {}", self.job_id, message);
        let mut event = SyncLogEvent::new(level.as_str(), message);
        event.details = details;
        event.job_id = Some(self.job_id.to_string());
        event.repo_id = Some(self.repo_id.to_string());
        self.broadcaster.send(event);
    }

    pub fn info(&self, message: &str) {
        self.emit(log::Level::Info, message, None);
    }

    pub fn info_with(&self, message: &str, details: serde_json::Value) {
        self.emit(log::Level::Info, message, Some(details));
    }

    pub fn warn(&self, message: &str) {
        self.emit(log::Level::Warn, message, None);
    }

    pub fn error(&self, message: &str) {
        self.emit(log::Level::Error, message, None);
    }
}
