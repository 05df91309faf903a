use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a repository sync job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    Pending,
    FetchingTree,
    ProcessingFiles,
    Completed,
    Failed,
    Cancelled,
}

impl SyncJobStatus {
    pub const ALL: [SyncJobStatus; 6] = [
        SyncJobStatus::Pending,
        SyncJobStatus::FetchingTree,
        SyncJobStatus::ProcessingFiles,
        SyncJobStatus::Completed,
        SyncJobStatus::Failed,
        SyncJobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobStatus::Pending => "pending",
            SyncJobStatus::FetchingTree => "fetching_tree",
            SyncJobStatus::ProcessingFiles => "processing_files",
            SyncJobStatus::Completed => "completed",
            SyncJobStatus::Failed => "failed",
            SyncJobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal rows never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncJobStatus::Completed | SyncJobStatus::Failed | SyncJobStatus::Cancelled
        )
    }

    /// Owned by a running orchestrator (or by a process that died holding it).
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SyncJobStatus::FetchingTree | SyncJobStatus::ProcessingFiles
        )
    }
}

impl fmt::Display for SyncJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncJobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown sync job status '{}'", s))
    }
}

/// Per-file sub-state within a sync job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileJobStatus {
    Pending,
    Processing,
    Completed,
    Skipped,
    Failed,
}

impl FileJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileJobStatus::Pending => "pending",
            FileJobStatus::Processing => "processing",
            FileJobStatus::Completed => "completed",
            FileJobStatus::Skipped => "skipped",
            FileJobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileJobStatus::Completed | FileJobStatus::Skipped | FileJobStatus::Failed
        )
    }
}

impl fmt::Display for FileJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileJobStatus::Pending),
            "processing" => Ok(FileJobStatus::Processing),
            "completed" => Ok(FileJobStatus::Completed),
            "skipped" => Ok(FileJobStatus::Skipped),
            "failed" => Ok(FileJobStatus::Failed),
            other => Err(format!("unknown file job status '{}'", other)),
        }
    }
}

/// Why a file's content was not fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SkipReason {
    TooLarge,
    IgnoredDirectory,
    LockFile,
    BinaryExtension,
    GeneratedFile,
    /// The job was configured with `skip_content`.
    ContentDisabled,
    /// `max_content_files` fetches were already spent.
    ContentBudgetExhausted,
    /// The source provider declined to serve the content.
    Upstream(String),
}

impl SkipReason {
    pub fn as_str(&self) -> &str {
        match self {
            SkipReason::TooLarge => "too_large",
            SkipReason::IgnoredDirectory => "ignored_directory",
            SkipReason::LockFile => "lock_file",
            SkipReason::BinaryExtension => "binary_extension",
            SkipReason::GeneratedFile => "generated_file",
            SkipReason::ContentDisabled => "content_disabled",
            SkipReason::ContentBudgetExhausted => "content_budget_exhausted",
            SkipReason::Upstream(reason) => reason,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SkipReason {
    fn from(s: &str) -> Self {
        match s {
            "too_large" => SkipReason::TooLarge,
            "ignored_directory" => SkipReason::IgnoredDirectory,
            "lock_file" => SkipReason::LockFile,
            "binary_extension" => SkipReason::BinaryExtension,
            "generated_file" => SkipReason::GeneratedFile,
            "content_disabled" => SkipReason::ContentDisabled,
            "content_budget_exhausted" => SkipReason::ContentBudgetExhausted,
            other => SkipReason::Upstream(other.to_string()),
        }
    }
}

impl From<String> for SkipReason {
    fn from(s: String) -> Self {
        SkipReason::from(s.as_str())
    }
}

impl From<SkipReason> for String {
    fn from(reason: SkipReason) -> Self {
        reason.as_str().to_string()
    }
}

/// Per-job knobs. Every field is optional; absence means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    /// Cap on the number of work-set entries turned into file rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    /// Cap on the number of content fetches actually issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_content_files: Option<usize>,
    /// Record the tree without fetching any content.
    #[serde(default)]
    pub skip_content: bool,
}

/// Job-level progress counters.
///
/// `processed` counts every file that reached a terminal sub-state,
/// including the skipped and failed ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounters {
    pub processed: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl JobCounters {
    pub fn record(&mut self, status: FileJobStatus) {
        match status {
            FileJobStatus::Completed => self.processed += 1,
            FileJobStatus::Skipped => {
                self.processed += 1;
                self.skipped += 1;
            }
            FileJobStatus::Failed => {
                self.processed += 1;
                self.failed += 1;
            }
            FileJobStatus::Pending | FileJobStatus::Processing => {}
        }
    }
}

/// One sync attempt for a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSyncJob {
    pub id: String,
    pub repo_id: String,
    pub status: SyncJobStatus,
    pub total_files: u32,
    pub processed_files: u32,
    pub skipped_files: u32,
    pub failed_files: u32,
    /// Head commit this job synchronized to, set on completion.
    pub commit_sha: Option<String>,
    pub config: JobConfig,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepoSyncJob {
    /// Creates a fresh PENDING job.
    pub fn pending(repo_id: &str, config: JobConfig) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            repo_id: repo_id.to_string(),
            status: SyncJobStatus::Pending,
            total_files: 0,
            processed_files: 0,
            skipped_files: 0,
            failed_files: 0,
            commit_sha: None,
            config,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn counters(&self) -> JobCounters {
        JobCounters {
            processed: self.processed_files,
            skipped: self.skipped_files,
            failed: self.failed_files,
        }
    }
}

/// One file entry within a sync job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSyncJob {
    pub id: String,
    pub sync_job_id: String,
    pub repo_id: String,
    /// Creation order within the job; iteration follows it.
    pub seq: u32,
    pub path: String,
    pub sha: String,
    pub size: u64,
    pub status: FileJobStatus,
    pub skip_reason: Option<SkipReason>,
    pub error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
