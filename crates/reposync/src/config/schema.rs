use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::JobConfig;
use crate::sync::DEFAULT_MAX_FILE_SIZE;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ledger location; `~/.reposync/data/reposync.db` when absent.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Job knobs used when a sync is requested without its own.
    #[serde(default)]
    pub default_job: JobConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Files above this many bytes are never fetched.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_stale_job_max_age_minutes")]
    pub stale_job_max_age_minutes: i64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

fn default_stale_job_max_age_minutes() -> i64 {
    60
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_job_max_age_minutes: 60,
            reconcile_interval_secs: 300,
        }
    }
}

impl RecoveryConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long an idle worker waits before re-checking for shutdown.
    #[serde(default = "default_idle_poll_millis")]
    pub idle_poll_millis: u64,
}

fn default_idle_poll_millis() -> u64 {
    500
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_poll_millis: 500,
        }
    }
}

impl WorkerConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_millis)
    }
}
