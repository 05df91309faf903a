//! Drives one repository sync job from PENDING to a terminal state.
//!
//! The run is strictly sequential: one file at a time, one writer per job.
//! Only setup-fatal conditions and unexpected errors leave [`SyncOrchestrator::run`];
//! [`SyncOrchestrator::execute`] turns those into a FAILED job and a failure
//! notification.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::broadcast::{JobLogger, LogBroadcaster, NoopNotifier, SyncNotifier, SyncProgressEvent};
use crate::db::{file_job_repo, file_repo, repo_repo, sync_job_repo, Database};
use crate::embedding::{EmbeddingTrigger, NoopEmbeddingTrigger};
use crate::error::{Result, SyncError};
use crate::model::{FileSyncJob, JobCounters, Repo, RepoSyncJob, SyncJobStatus};
use crate::source::{CredentialResolver, RepoContext, SourceProvider, TreeEntry};

use super::classifier::Classifier;
use super::diff::{plan_work, WorkPlan};
use super::file_processor::{FileOutcome, FileProcessor};

/// Counters are written to the ledger (and progress is announced) every this many files.
pub const CHECKPOINT_INTERVAL: usize = 10;
/// A percentage line is logged every this many files.
pub const LOG_INTERVAL: usize = 25;

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub job_id: String,
    pub repo_id: String,
    /// `empty`, `unchanged`, `incremental` or `full`.
    pub plan: &'static str,
    pub total_files: u32,
    pub counters: JobCounters,
    pub commit_sha: Option<String>,
    pub truncated: bool,
}

pub struct SyncOrchestrator {
    db: Database,
    source: Arc<dyn SourceProvider>,
    credentials: Arc<dyn CredentialResolver>,
    notifier: Arc<dyn SyncNotifier>,
    embedding: Arc<dyn EmbeddingTrigger>,
    logs: LogBroadcaster,
    classifier: Classifier,
}

impl SyncOrchestrator {
    pub fn new(
        db: Database,
        source: Arc<dyn SourceProvider>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            db,
            source,
            credentials,
            notifier: Arc::new(NoopNotifier),
            embedding: Arc::new(NoopEmbeddingTrigger),
            logs: LogBroadcaster::default(),
            classifier: Classifier::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn SyncNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_embedding_trigger(mut self, embedding: Arc<dyn EmbeddingTrigger>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_log_broadcaster(mut self, logs: LogBroadcaster) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn log_broadcaster(&self) -> &LogBroadcaster {
        &self.logs
    }

    /// Runs a job and records any escaping error as a FAILED job.
    ///
    /// Returns `Ok(None)` when the job was not PENDING, e.g. because another
    /// worker already claimed it or it was cancelled meanwhile.
    pub async fn execute(&self, job_id: &str) -> Result<Option<SyncReport>> {
        let job = self.load_job(job_id)?;
        let repo_id = job.repo_id.clone();
        match self.run_job(job).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let message = e.to_string();
                log::error!("Sync job {} failed: {}", job_id, message);

                match sync_job_repo::fail(&self.db, job_id, &message, Utc::now()) {
                    Ok(true) => {}
                    Ok(false) => log::warn!("Sync job {} was no longer live, left as is", job_id),
                    Err(db_err) => {
                        log::error!("Could not mark sync job {} failed: {}", job_id, db_err)
                    }
                }

                self.notifier
                    .notify(SyncProgressEvent::failed(job_id, &repo_id, &message));
                Err(e)
            }
        }
    }

    /// Runs a job without the failure bookkeeping of [`execute`](Self::execute).
    pub async fn run(&self, job_id: &str) -> Result<Option<SyncReport>> {
        let job = self.load_job(job_id)?;
        self.run_job(job).await
    }

    fn load_job(&self, job_id: &str) -> Result<RepoSyncJob> {
        sync_job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| SyncError::JobNotFound(job_id.to_string()))
    }

    async fn run_job(&self, job: RepoSyncJob) -> Result<Option<SyncReport>> {
        if job.status != SyncJobStatus::Pending {
            log::debug!("Sync job {} is {}, nothing to do", job.id, job.status);
            return Ok(None);
        }

        let repo = repo_repo::find_by_id(&self.db, &job.repo_id)?
            .ok_or_else(|| SyncError::RepoNotFound(job.repo_id.clone()))?;
        let installation_id =
            self.credentials
                .resolve(&repo)
                .await
                .ok_or_else(|| SyncError::MissingCredentials {
                    repo: repo.full_name.clone(),
                })?;
        let ctx = RepoContext {
            installation_id,
            full_name: repo.full_name.clone(),
        };
        let logger = self.logs.for_job(&job.id, &repo.id);

        let branch = self.resolve_branch(&repo, &ctx, &logger).await?;

        if !sync_job_repo::claim(&self.db, &job.id, Utc::now())? {
            log::debug!("Sync job {} was claimed elsewhere", job.id);
            return Ok(None);
        }
        self.announce(&job, SyncJobStatus::FetchingTree, 0, JobCounters::default(), None);
        logger.info(&format!("Syncing {} on branch {}", repo.full_name, branch));

        let plan = plan_work(
            self.source.as_ref(),
            &ctx,
            &branch,
            repo.last_commit_sha.as_deref(),
        )
        .await?;
        let plan_kind = plan.kind();

        let (mut entries, full_paths, commit_sha) = match plan {
            WorkPlan::EmptyRepository => {
                logger.info("Repository is empty, nothing to sync");
                return self.finish_without_files(&job, &repo, plan_kind, None, &logger);
            }
            WorkPlan::Unchanged { commit_sha } => {
                logger.info(&format!("No changes since {}", commit_sha));
                return self.finish_without_files(&job, &repo, plan_kind, Some(commit_sha), &logger);
            }
            WorkPlan::Incremental {
                entries,
                removed,
                commit_sha,
            } => {
                let deleted = file_repo::delete_paths(&self.db, &repo.id, &removed)?;
                if deleted > 0 {
                    logger.info(&format!("Removed {} deleted files from the mirror", deleted));
                }
                (entries, None, commit_sha)
            }
            WorkPlan::Full {
                entries,
                commit_sha,
            } => {
                let paths: HashSet<String> = entries.iter().map(|e| e.path.clone()).collect();
                (entries, Some(paths), commit_sha)
            }
        };
        logger.info_with(
            &format!("Planned {} sync with {} files", plan_kind, entries.len()),
            serde_json::json!({ "plan": plan_kind, "files": entries.len(), "commitSha": &commit_sha }),
        );

        let truncated = apply_max_files(&mut entries, job.config.max_files);
        if truncated {
            logger.warn(&format!(
                "Work set truncated to maxFiles={}",
                entries.len()
            ));
        }

        if entries.is_empty() {
            if let Some(paths) = &full_paths {
                self.remove_tombstones(&repo.id, paths, &logger)?;
            }
            let mut report =
                self.finish_without_files(&job, &repo, plan_kind, Some(commit_sha), &logger)?;
            if let Some(report) = report.as_mut() {
                report.truncated = truncated;
            }
            return Ok(report);
        }

        let total = u32::try_from(entries.len()).unwrap_or(u32::MAX);
        file_job_repo::replace_for_job(&self.db, &job.id, &repo.id, &entries)?;
        if !sync_job_repo::start_processing(&self.db, &job.id, total)? {
            logger.warn("Job left FETCHING_TREE underneath the orchestrator, abandoning run");
            return Ok(None);
        }
        self.announce(
            &job,
            SyncJobStatus::ProcessingFiles,
            total,
            JobCounters::default(),
            None,
        );

        let counters = self.process_files(&job, &repo, &ctx, total, &logger).await?;

        if let Some(paths) = &full_paths {
            self.remove_tombstones(&repo.id, paths, &logger)?;
        }

        let now = Utc::now();
        repo_repo::record_sync(&self.db, &repo.id, Some(&commit_sha), now)?;
        if !sync_job_repo::complete(&self.db, &job.id, &counters, Some(&commit_sha), now)? {
            logger.warn("Job was no longer in flight at completion");
        }
        self.announce(&job, SyncJobStatus::Completed, total, counters, None);
        logger.info_with(
            &format!(
                "Sync completed: {} processed, {} skipped, {} failed",
                counters.processed, counters.skipped, counters.failed
            ),
            serde_json::to_value(counters).unwrap_or_default(),
        );

        self.trigger_embedding(&repo.id).await;

        Ok(Some(SyncReport {
            job_id: job.id.clone(),
            repo_id: repo.id.clone(),
            plan: plan_kind,
            total_files: total,
            counters,
            commit_sha: Some(commit_sha),
            truncated,
        }))
    }

    async fn resolve_branch(
        &self,
        repo: &Repo,
        ctx: &RepoContext,
        logger: &JobLogger<'_>,
    ) -> Result<String> {
        match self.source.default_branch(ctx).await {
            Ok(branch) => {
                if repo.default_branch.as_deref() != Some(branch.as_str()) {
                    log::info!(
                        "Default branch of {} is now {} (was {})",
                        repo.full_name,
                        branch,
                        repo.cached_branch()
                    );
                    repo_repo::update_default_branch(&self.db, &repo.id, &branch)?;
                }
                Ok(branch)
            }
            Err(e) => {
                logger.warn(&format!(
                    "Could not resolve default branch ({}), using {}",
                    e,
                    repo.cached_branch()
                ));
                Ok(repo.cached_branch().to_string())
            }
        }
    }

    async fn process_files(
        &self,
        job: &RepoSyncJob,
        repo: &Repo,
        ctx: &RepoContext,
        total: u32,
        logger: &JobLogger<'_>,
    ) -> Result<JobCounters> {
        let files = file_job_repo::list_for_job(&self.db, &job.id)?;
        let count = files.len();
        let mut processor = FileProcessor::new(
            self.source.as_ref(),
            ctx,
            self.classifier,
            job.config.skip_content,
            job.config.max_content_files,
        );
        let mut counters = JobCounters::default();

        for (index, file) in files.iter().enumerate() {
            let done = index + 1;
            let is_last = done == count;

            file_job_repo::mark_processing(&self.db, &file.id)?;
            let outcome = match self.process_file(&mut processor, repo, file).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!("Failed to process {}: {}", file.path, e);
                    FileOutcome::Failed(e.to_string())
                }
            };

            let status = outcome.status();
            let (reason, error) = match &outcome {
                FileOutcome::Content(_) => (None, None),
                FileOutcome::Skipped(reason) => (Some(reason), None),
                FileOutcome::Failed(error) => (None, Some(error.as_str())),
            };
            file_job_repo::finish(&self.db, &file.id, status, reason, error, Utc::now())?;
            counters.record(status);

            if done % CHECKPOINT_INTERVAL == 0 || is_last {
                sync_job_repo::checkpoint(&self.db, &job.id, &counters)?;
                self.announce(
                    job,
                    SyncJobStatus::ProcessingFiles,
                    total,
                    counters,
                    Some(&file.path),
                );
            }
            if done % LOG_INTERVAL == 0 || is_last {
                let percent = done * 100 / count;
                logger.info(&format!("Processed {}/{} files ({}%)", done, count, percent));
            }
        }

        Ok(counters)
    }

    /// Fetches or skips one file and mirrors the result.
    async fn process_file(
        &self,
        processor: &mut FileProcessor<'_>,
        repo: &Repo,
        file: &FileSyncJob,
    ) -> Result<FileOutcome> {
        let outcome = processor.process(file).await;
        let entry = TreeEntry::new(file.path.clone(), file.sha.clone(), file.size);
        match &outcome {
            FileOutcome::Content(content) => {
                file_repo::upsert(&self.db, &repo.id, &entry, Some(content), None)?;
            }
            FileOutcome::Skipped(reason) => {
                file_repo::upsert(&self.db, &repo.id, &entry, None, Some(reason))?;
            }
            FileOutcome::Failed(_) => {}
        }
        Ok(outcome)
    }

    /// Completes a job that has no file rows to process.
    fn finish_without_files(
        &self,
        job: &RepoSyncJob,
        repo: &Repo,
        plan: &'static str,
        commit_sha: Option<String>,
        logger: &JobLogger<'_>,
    ) -> Result<Option<SyncReport>> {
        let now = Utc::now();
        let counters = JobCounters::default();
        // Rows left by an interrupted earlier attempt would outnumber processed_files.
        let stale_rows = file_job_repo::delete_for_job(&self.db, &job.id)?;
        if stale_rows > 0 {
            log::debug!(
                "Dropped {} file rows from an earlier attempt of job {}",
                stale_rows,
                job.id
            );
        }
        repo_repo::record_sync(&self.db, &repo.id, commit_sha.as_deref(), now)?;
        if !sync_job_repo::complete(&self.db, &job.id, &counters, commit_sha.as_deref(), now)? {
            logger.warn("Job was no longer in flight at completion");
        }
        self.announce(job, SyncJobStatus::Completed, 0, counters, None);
        logger.info("Sync completed with no files to process");

        Ok(Some(SyncReport {
            job_id: job.id.clone(),
            repo_id: repo.id.clone(),
            plan,
            total_files: 0,
            counters,
            commit_sha,
            truncated: false,
        }))
    }

    fn remove_tombstones(
        &self,
        repo_id: &str,
        upstream_paths: &HashSet<String>,
        logger: &JobLogger<'_>,
    ) -> Result<()> {
        let keep: HashSet<&str> = upstream_paths.iter().map(String::as_str).collect();
        let removed = file_repo::delete_absent(&self.db, repo_id, &keep)?;
        if removed > 0 {
            logger.info(&format!("Removed {} files no longer present upstream", removed));
        }
        Ok(())
    }

    async fn trigger_embedding(&self, repo_id: &str) {
        let pending = match file_repo::count_needing_embedding(&self.db, repo_id) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("Could not count files needing embedding for {}: {}", repo_id, e);
                return;
            }
        };
        if pending == 0 {
            return;
        }
        if let Err(e) = self.embedding.notify_may_need_embedding(repo_id).await {
            log::warn!("Embedding trigger failed for repo {}: {}", repo_id, e);
        }
    }

    fn announce(
        &self,
        job: &RepoSyncJob,
        status: SyncJobStatus,
        total: u32,
        counters: JobCounters,
        current_file: Option<&str>,
    ) {
        let mut event = SyncProgressEvent::new(&job.id, &job.repo_id, status, total, counters);
        if let Some(path) = current_file {
            event = event.with_current_file(path);
        }
        self.notifier.notify(event);
    }
}

/// Truncates `entries` to `max_files`. Returns true when anything was dropped.
fn apply_max_files(entries: &mut Vec<TreeEntry>, max_files: Option<usize>) -> bool {
    match max_files {
        Some(max) if entries.len() > max => {
            entries.truncate(max);
            true
        }
        _ => false,
    }
}
