//! Work announcement.
//!
//! A dispatcher tells workers "process job X now". Its state is ephemeral
//! and may vanish at any time; the ledger stays authoritative and recovery
//! re-enqueues whatever the dispatcher forgot. Entries are keyed by a stable
//! key derived from the job id so presence can be checked.

pub mod queue;
pub mod worker;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::model::RepoSyncJob;

pub use queue::QueueDispatcher;
pub use worker::SyncWorker;

const SYNC_KEY_PREFIX: &str = "repo-sync:";

/// Dispatcher key for a sync job.
pub fn sync_job_key(job_id: &str) -> String {
    format!("{}{}", SYNC_KEY_PREFIX, job_id)
}

/// Payload announcing a sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJobMessage {
    pub job_id: String,
    pub repo_id: String,
}

/// One entry handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub key: String,
    pub payload: String,
}

impl Delivery {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DispatchError> {
        serde_json::from_str(&self.payload).map_err(|source| DispatchError::Decode {
            key: self.key.clone(),
            source,
        })
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Adds an entry. Returns false if `key` is already present.
    async fn enqueue(&self, key: &str, payload: String) -> Result<bool, DispatchError>;

    /// True from enqueue until the entry is acked.
    async fn contains(&self, key: &str) -> Result<bool, DispatchError>;

    /// Waits for the next entry. `None` once the dispatcher is closed.
    async fn next(&self) -> Option<Delivery>;

    /// Marks a delivered entry as done.
    async fn ack(&self, key: &str) -> Result<(), DispatchError>;
}

/// Enqueues a sync job under its stable key.
pub async fn enqueue_sync_job(
    dispatcher: &dyn Dispatcher,
    job: &RepoSyncJob,
) -> Result<bool, DispatchError> {
    let message = SyncJobMessage {
        job_id: job.id.clone(),
        repo_id: job.repo_id.clone(),
    };
    let payload = serde_json::to_string(&message).map_err(DispatchError::Encode)?;
    dispatcher.enqueue(&sync_job_key(&job.id), payload).await
}
