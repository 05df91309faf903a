//! Ledger/dispatcher reconciliation.
//!
//! Three idempotent repairs:
//!
//! - `recover_stuck_jobs` returns in-flight rows left by a dead process to PENDING.
//! - `requeue_orphaned_jobs` re-announces PENDING rows the dispatcher forgot.
//! - `cancel_stale_jobs` gives up on PENDING rows that waited too long.
//!
//! None of them matches a row owned by a live orchestrator: such rows are in
//! flight, and only startup recovery touches in-flight rows.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::{embedding_job_repo, sync_job_repo, Database};
use crate::dispatch::{enqueue_sync_job, sync_job_key, Dispatcher};
use crate::error::Result;
use crate::model::SyncJobStatus;

/// Rows reset by [`Reconciler::recover_stuck_jobs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredJobs {
    pub sync_jobs: usize,
    pub embedding_jobs: usize,
}

/// Result of a reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    /// Only set by the startup pass.
    pub recovered: Option<RecoveredJobs>,
    pub cancelled: Vec<String>,
    pub requeued: usize,
    /// True when another cycle was already running and this one did nothing.
    pub skipped: bool,
}

pub struct Reconciler {
    db: Database,
    dispatcher: Arc<dyn Dispatcher>,
    stale_after_minutes: i64,
    /// Serializes whole cycles; the individual operations stay callable.
    cycle_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(db: Database, dispatcher: Arc<dyn Dispatcher>, stale_after_minutes: i64) -> Self {
        Self {
            db,
            dispatcher,
            stale_after_minutes,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Resets every in-flight sync and embedding job to PENDING.
    ///
    /// Only call at process start, before any worker runs.
    pub fn recover_stuck_jobs(&self) -> Result<RecoveredJobs> {
        let now = Utc::now();
        let recovered = RecoveredJobs {
            sync_jobs: sync_job_repo::reset_in_flight(&self.db, now)?,
            embedding_jobs: embedding_job_repo::reset_in_flight(&self.db, now)?,
        };
        if recovered.sync_jobs > 0 || recovered.embedding_jobs > 0 {
            log::warn!(
                "Recovered {} sync jobs and {} embedding jobs stuck in flight",
                recovered.sync_jobs,
                recovered.embedding_jobs
            );
        }
        Ok(recovered)
    }

    /// Enqueues every PENDING job whose key the dispatcher does not hold.
    /// Returns how many entries were added.
    pub async fn requeue_orphaned_jobs(&self) -> Result<usize> {
        let pending = sync_job_repo::list_by_status(&self.db, SyncJobStatus::Pending)?;
        let mut requeued = 0;
        for job in &pending {
            if self.dispatcher.contains(&sync_job_key(&job.id)).await? {
                continue;
            }
            if enqueue_sync_job(self.dispatcher.as_ref(), job).await? {
                log::info!("Re-enqueued orphaned sync job {} (repo {})", job.id, job.repo_id);
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    /// Cancels jobs that have waited in PENDING for more than `max_age_minutes`.
    ///
    /// A job reset by [`recover_stuck_jobs`](Self::recover_stuck_jobs) starts
    /// waiting again at the reset, however old the row is.
    pub fn cancel_stale_jobs(&self, max_age_minutes: i64) -> Result<Vec<String>> {
        let now = Utc::now();
        let cutoff = now - Duration::minutes(max_age_minutes);
        let error = format!(
            "Cancelled: pending for more than {} minutes without being processed",
            max_age_minutes
        );
        let cancelled = sync_job_repo::cancel_pending_before(&self.db, cutoff, &error, now)?;
        if !cancelled.is_empty() {
            log::warn!("Cancelled {} stale pending sync jobs", cancelled.len());
        }
        Ok(cancelled)
    }

    /// Startup pass: recover, then cancel stale, then requeue what is left.
    pub async fn startup(&self) -> Result<ReconcileResult> {
        let _guard = self.cycle_lock.lock().await;
        let recovered = self.recover_stuck_jobs()?;
        let cancelled = self.cancel_stale_jobs(self.stale_after_minutes)?;
        let requeued = self.requeue_orphaned_jobs().await?;
        Ok(ReconcileResult {
            recovered: Some(recovered),
            cancelled,
            requeued,
            skipped: false,
        })
    }

    /// Periodic pass: cancel stale, then requeue.
    ///
    /// Returns early if another cycle is already running.
    pub async fn reconcile(&self) -> Result<ReconcileResult> {
        let _guard = match self.cycle_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::info!("Reconcile skipped: another reconcile is already in progress");
                return Ok(ReconcileResult {
                    skipped: true,
                    ..Default::default()
                });
            }
        };
        let cancelled = self.cancel_stale_jobs(self.stale_after_minutes)?;
        let requeued = self.requeue_orphaned_jobs().await?;
        Ok(ReconcileResult {
            recovered: None,
            cancelled,
            requeued,
            skipped: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo_repo;
    use crate::dispatch::QueueDispatcher;
    use crate::model::{JobConfig, Repo, RepoSyncJob};

    fn setup() -> (Database, Arc<QueueDispatcher>, Reconciler) {
        let db = Database::open_in_memory().unwrap();
        let dispatcher = Arc::new(QueueDispatcher::new());
        let reconciler = Reconciler::new(db.clone(), dispatcher.clone(), 60);
        (db, dispatcher, reconciler)
    }

    fn pending_job(db: &Database, name: &str) -> RepoSyncJob {
        let repo = Repo::new(name);
        repo_repo::insert(db, &repo).unwrap();
        let job = RepoSyncJob::pending(&repo.id, JobConfig::default());
        sync_job_repo::insert(db, &job).unwrap();
        job
    }

    #[tokio::test]
    async fn test_reconcile_skips_when_cycle_running() {
        let (_db, _dispatcher, reconciler) = setup();
        let _held = reconciler.cycle_lock.lock().await;
        let result = reconciler.reconcile().await.unwrap();
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn test_startup_requeues_recovered_jobs() {
        let (db, dispatcher, reconciler) = setup();
        let job = pending_job(&db, "acme/widgets");
        sync_job_repo::claim(&db, &job.id, Utc::now()).unwrap();

        let result = reconciler.startup().await.unwrap();
        assert_eq!(result.recovered.unwrap().sync_jobs, 1);
        assert_eq!(result.requeued, 1);
        assert!(dispatcher.contains(&sync_job_key(&job.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_startup_keeps_long_running_job_after_crash() {
        let (db, dispatcher, reconciler) = setup();
        let repo = Repo::new("acme/widgets");
        repo_repo::insert(&db, &repo).unwrap();
        let mut job = RepoSyncJob::pending(&repo.id, JobConfig::default());
        job.created_at = Utc::now() - Duration::minutes(90);
        job.updated_at = job.created_at;
        sync_job_repo::insert(&db, &job).unwrap();
        sync_job_repo::claim(&db, &job.id, Utc::now() - Duration::minutes(88)).unwrap();

        let result = reconciler.startup().await.unwrap();
        assert_eq!(result.recovered.unwrap().sync_jobs, 1);
        assert!(result.cancelled.is_empty());
        assert_eq!(result.requeued, 1);

        let found = sync_job_repo::find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, SyncJobStatus::Pending);
        assert!(dispatcher.contains(&sync_job_key(&job.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_periodic_pass_does_not_reset_in_flight_jobs() {
        let (db, _dispatcher, reconciler) = setup();
        let job = pending_job(&db, "acme/widgets");
        sync_job_repo::claim(&db, &job.id, Utc::now()).unwrap();

        let result = reconciler.reconcile().await.unwrap();
        assert!(result.recovered.is_none());
        assert_eq!(result.requeued, 0);
        let found = sync_job_repo::find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, SyncJobStatus::FetchingTree);
    }
}
