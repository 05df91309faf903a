//! Domain types shared by the ledger, the orchestrator and recovery.

pub mod job;
pub mod repo;

pub use job::{
    FileJobStatus, FileSyncJob, JobConfig, JobCounters, RepoSyncJob, SkipReason, SyncJobStatus,
};
pub use repo::Repo;
