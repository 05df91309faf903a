pub mod broadcast;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod embedding;
pub mod error;
pub mod logging;
pub mod model;
pub mod recovery;
pub mod service;
pub mod source;
pub mod sync;

pub use broadcast::{BroadcastNotifier, LogBroadcaster, NoopNotifier, SyncNotifier, SyncProgressEvent};
pub use config::{load_config, load_config_from_str, EngineConfig};
pub use db::{Database, DatabaseError};
pub use dispatch::{Dispatcher, QueueDispatcher, SyncWorker};
pub use embedding::{EmbeddingTrigger, LedgerEmbeddingTrigger, NoopEmbeddingTrigger};
pub use error::{ConfigError, DispatchError, Result, SyncError};
pub use model::{
    FileJobStatus, FileSyncJob, JobConfig, JobCounters, Repo, RepoSyncJob, SkipReason,
    SyncJobStatus,
};
pub use recovery::{ReconcileScheduler, Reconciler};
pub use service::SyncService;
pub use source::{CredentialResolver, SourceError, SourceProvider};
pub use sync::{classify, SyncOrchestrator, SyncReport};
