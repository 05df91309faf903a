//! Sync progress notifications.
//!
//! Notifiers are fire-and-forget: `notify` must return promptly and must
//! never fail the caller, whether or not anyone is listening.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{JobCounters, SyncJobStatus};

/// Progress event for a sync job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgressEvent {
    pub job_id: String,
    pub repo_id: String,
    pub status: SyncJobStatus,
    pub processed_files: u32,
    pub total_files: u32,
    pub skipped_files: u32,
    pub failed_files: u32,
    /// Path most recently processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SyncProgressEvent {
    pub fn new(
        job_id: &str,
        repo_id: &str,
        status: SyncJobStatus,
        total_files: u32,
        counters: JobCounters,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            repo_id: repo_id.to_string(),
            status,
            processed_files: counters.processed,
            total_files,
            skipped_files: counters.skipped,
            failed_files: counters.failed,
            current_file: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_current_file(mut self, path: &str) -> Self {
        self.current_file = Some(path.to_string());
        self
    }

    /// Creates a failure event.
    pub fn failed(job_id: &str, repo_id: &str, error: &str) -> Self {
        let mut event = Self::new(
            job_id,
            repo_id,
            SyncJobStatus::Failed,
            0,
            JobCounters::default(),
        );
        event.error = Some(error.to_string());
        event
    }
}

/// Receives progress events from the orchestrator.
pub trait SyncNotifier: Send + Sync {
    fn notify(&self, event: SyncProgressEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl SyncNotifier for NoopNotifier {
    fn notify(&self, _event: SyncProgressEvent) {}
}

/// Broadcasts progress events to any number of subscribers.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: Arc<broadcast::Sender<SyncProgressEvent>>,
}

impl BroadcastNotifier {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncProgressEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl SyncNotifier for BroadcastNotifier {
    fn notify(&self, event: SyncProgressEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }
}
