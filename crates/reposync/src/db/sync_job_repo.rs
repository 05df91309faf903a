//! Sync job ledger: state transitions for the `repo_sync_jobs` table.
//!
//! Every transition is a guarded `UPDATE` whose `WHERE` clause names the
//! states it may leave. A transition that matches no row reports `false`
//! instead of silently rewriting a job someone else already moved. Terminal
//! rows (`completed`, `failed`, `cancelled`) are never matched.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::{JobConfig, JobCounters, RepoSyncJob, SyncJobStatus};

/// Error marker written by startup recovery.
pub const RECOVERED_MARKER: &str = "recovered after restart";

const LIVE_STATUSES: &str = "('pending', 'fetching_tree', 'processing_files')";

struct SyncJobRow {
    id: String,
    repo_id: String,
    status: String,
    total_files: u32,
    processed_files: u32,
    skipped_files: u32,
    failed_files: u32,
    commit_sha: Option<String>,
    config: String,
    error: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SyncJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            repo_id: row.get("repo_id")?,
            status: row.get("status")?,
            total_files: row.get("total_files")?,
            processed_files: row.get("processed_files")?,
            skipped_files: row.get("skipped_files")?,
            failed_files: row.get("failed_files")?,
            commit_sha: row.get("commit_sha")?,
            config: row.get("config")?,
            error: row.get("error")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_job(self) -> Result<RepoSyncJob, DatabaseError> {
        let status = self
            .status
            .parse::<SyncJobStatus>()
            .map_err(|_| DatabaseError::CorruptRow {
                id: self.id.clone(),
                column: "status",
                value: self.status.clone(),
            })?;
        let config: JobConfig =
            serde_json::from_str(&self.config).map_err(|_| DatabaseError::CorruptRow {
                id: self.id.clone(),
                column: "config",
                value: self.config.clone(),
            })?;

        Ok(RepoSyncJob {
            started_at: parse_optional_timestamp(&self.id, "started_at", self.started_at)?,
            completed_at: parse_optional_timestamp(&self.id, "completed_at", self.completed_at)?,
            created_at: parse_timestamp(&self.id, "created_at", &self.created_at)?,
            updated_at: parse_timestamp(&self.id, "updated_at", &self.updated_at)?,
            id: self.id,
            repo_id: self.repo_id,
            status,
            total_files: self.total_files,
            processed_files: self.processed_files,
            skipped_files: self.skipped_files,
            failed_files: self.failed_files,
            commit_sha: self.commit_sha,
            config,
            error: self.error,
        })
    }
}

fn collect_jobs(rows: Vec<SyncJobRow>) -> Result<Vec<RepoSyncJob>, DatabaseError> {
    rows.into_iter().map(SyncJobRow::into_job).collect()
}

fn insert_with(conn: &Connection, job: &RepoSyncJob) -> Result<(), DatabaseError> {
    let config = serde_json::to_string(&job.config).map_err(|e| DatabaseError::CorruptRow {
        id: job.id.clone(),
        column: "config",
        value: e.to_string(),
    })?;
    conn.execute(
        "INSERT INTO repo_sync_jobs (id, repo_id, status, total_files, processed_files,
         skipped_files, failed_files, commit_sha, config, error, started_at, completed_at,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            job.id,
            job.repo_id,
            job.status.as_str(),
            job.total_files,
            job.processed_files,
            job.skipped_files,
            job.failed_files,
            job.commit_sha,
            config,
            job.error,
            job.started_at.map(format_timestamp),
            job.completed_at.map(format_timestamp),
            format_timestamp(job.created_at),
            format_timestamp(job.updated_at),
        ],
    )?;
    Ok(())
}

fn find_live_with(conn: &Connection, repo_id: &str) -> Result<Option<SyncJobRow>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT * FROM repo_sync_jobs WHERE repo_id = ?1 AND status IN {}
                 ORDER BY created_at ASC LIMIT 1",
                LIVE_STATUSES
            ),
            params![repo_id],
            SyncJobRow::from_row,
        )
        .optional()?)
}

/// Inserts a job row as-is.
pub fn insert(db: &Database, job: &RepoSyncJob) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_with(conn, job))
}

enum LiveJob {
    Existing(SyncJobRow),
    Created(RepoSyncJob),
}

/// Returns the live job for `repo_id` if one exists, otherwise inserts a
/// new PENDING job. The boolean reports whether a row was created.
pub fn create_or_get_live(
    db: &Database,
    repo_id: &str,
    config: &JobConfig,
) -> Result<(RepoSyncJob, bool), DatabaseError> {
    let live = db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        if let Some(row) = find_live_with(&tx, repo_id)? {
            return Ok(LiveJob::Existing(row));
        }
        let job = RepoSyncJob::pending(repo_id, config.clone());
        insert_with(&tx, &job)?;
        tx.commit()?;
        Ok(LiveJob::Created(job))
    })?;

    match live {
        LiveJob::Existing(row) => Ok((row.into_job()?, false)),
        LiveJob::Created(job) => Ok((job, true)),
    }
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<RepoSyncJob>, DatabaseError> {
    let row = db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM repo_sync_jobs WHERE id = ?1",
                params![id],
                SyncJobRow::from_row,
            )
            .optional()?)
    })?;
    row.map(SyncJobRow::into_job).transpose()
}

/// Finds the oldest non-terminal job for a repo.
pub fn find_live_for_repo(db: &Database, repo_id: &str) -> Result<Option<RepoSyncJob>, DatabaseError> {
    let row = db.with_conn(|conn| find_live_with(conn, repo_id))?;
    row.map(SyncJobRow::into_job).transpose()
}

/// Lists jobs in the given status, oldest first.
pub fn list_by_status(
    db: &Database,
    status: SyncJobStatus,
) -> Result<Vec<RepoSyncJob>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM repo_sync_jobs WHERE status = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![status.as_str()], SyncJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    collect_jobs(rows)
}

/// Lists every job recorded for a repo, newest first.
pub fn list_for_repo(db: &Database, repo_id: &str) -> Result<Vec<RepoSyncJob>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM repo_sync_jobs WHERE repo_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![repo_id], SyncJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    collect_jobs(rows)
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: SyncJobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM repo_sync_jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Claims a PENDING job for an orchestrator: PENDING → FETCHING_TREE.
pub fn claim(db: &Database, id: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE repo_sync_jobs SET status = 'fetching_tree', started_at = ?2, updated_at = ?2,
             error = NULL
             WHERE id = ?1 AND status = 'pending'",
            params![id, format_timestamp(now)],
        )?;
        Ok(changed == 1)
    })
}

/// FETCHING_TREE → PROCESSING_FILES with the size of the work set.
pub fn start_processing(db: &Database, id: &str, total_files: u32) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE repo_sync_jobs SET status = 'processing_files', total_files = ?2,
             processed_files = 0, skipped_files = 0, failed_files = 0, updated_at = ?3
             WHERE id = ?1 AND status = 'fetching_tree'",
            params![id, total_files, format_timestamp(Utc::now())],
        )?;
        Ok(changed == 1)
    })
}

/// Writes intermediate counters for a job still processing files.
pub fn checkpoint(db: &Database, id: &str, counters: &JobCounters) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE repo_sync_jobs SET processed_files = ?2, skipped_files = ?3,
             failed_files = ?4, updated_at = ?5
             WHERE id = ?1 AND status = 'processing_files'",
            params![
                id,
                counters.processed,
                counters.skipped,
                counters.failed,
                format_timestamp(Utc::now())
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Finalizes an in-flight job as COMPLETED with its final counters.
pub fn complete(
    db: &Database,
    id: &str,
    counters: &JobCounters,
    commit_sha: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE repo_sync_jobs SET status = 'completed', processed_files = ?2,
             skipped_files = ?3, failed_files = ?4, commit_sha = ?5, error = NULL,
             completed_at = ?6, updated_at = ?6
             WHERE id = ?1 AND status IN ('fetching_tree', 'processing_files')",
            params![
                id,
                counters.processed,
                counters.skipped,
                counters.failed,
                commit_sha,
                format_timestamp(now)
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Marks a live job FAILED.
///
/// Counters are recomputed from the job's file rows so that
/// `processed_files` always equals the number of terminal file rows.
pub fn fail(db: &Database, id: &str, error: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            &format!(
                "UPDATE repo_sync_jobs SET status = 'failed', error = ?2,
                 processed_files = (SELECT COUNT(*) FROM file_sync_jobs
                     WHERE sync_job_id = ?1 AND status IN ('completed', 'skipped', 'failed')),
                 skipped_files = (SELECT COUNT(*) FROM file_sync_jobs
                     WHERE sync_job_id = ?1 AND status = 'skipped'),
                 failed_files = (SELECT COUNT(*) FROM file_sync_jobs
                     WHERE sync_job_id = ?1 AND status = 'failed'),
                 completed_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND status IN {}",
                LIVE_STATUSES
            ),
            params![id, error, format_timestamp(now)],
        )?;
        Ok(changed == 1)
    })
}

/// Returns every in-flight job to PENDING with zeroed progress.
///
/// Only valid at process start, when no orchestrator can own those rows.
pub fn reset_in_flight(db: &Database, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE repo_sync_jobs SET status = 'pending', total_files = 0,
             processed_files = 0, skipped_files = 0, failed_files = 0, started_at = NULL,
             error = ?1, updated_at = ?2
             WHERE status IN ('fetching_tree', 'processing_files')",
            params![RECOVERED_MARKER, format_timestamp(now)],
        )?;
        Ok(changed)
    })
}

/// Cancels jobs that have been PENDING since before `cutoff`. Returns the
/// cancelled ids.
///
/// A PENDING row's `updated_at` is the moment it entered PENDING: creation,
/// or the reset done by startup recovery. No other transition touches it.
pub fn cancel_pending_before(
    db: &Database,
    cutoff: DateTime<Utc>,
    error: &str,
    now: DateTime<Utc>,
) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let cutoff = format_timestamp(cutoff);
        let ids = {
            let mut stmt = tx.prepare(
                "SELECT id FROM repo_sync_jobs WHERE status = 'pending' AND updated_at < ?1
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![cutoff], |r| r.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.execute(
            "UPDATE repo_sync_jobs SET status = 'cancelled', error = ?2, completed_at = ?3,
             updated_at = ?3
             WHERE status = 'pending' AND updated_at < ?1",
            params![cutoff, error, format_timestamp(now)],
        )?;
        tx.commit()?;
        Ok(ids)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo_repo;
    use crate::model::Repo;

    fn test_db() -> (Database, Repo) {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let repo = Repo::new("acme/widgets");
        repo_repo::insert(&db, &repo).unwrap();
        (db, repo)
    }

    fn job_with_status(repo_id: &str, status: SyncJobStatus) -> RepoSyncJob {
        let mut job = RepoSyncJob::pending(repo_id, JobConfig::default());
        job.status = status;
        job
    }

    #[test]
    fn test_insert_and_find() {
        let (db, repo) = test_db();
        let config = JobConfig {
            max_files: Some(5),
            ..Default::default()
        };
        let job = RepoSyncJob::pending(&repo.id, config.clone());
        insert(&db, &job).unwrap();

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, SyncJobStatus::Pending);
        assert_eq!(found.config, config);
        assert!(found.started_at.is_none());
    }

    #[test]
    fn test_create_or_get_live_is_idempotent_by_repo() {
        let (db, repo) = test_db();
        let (first, created) =
            create_or_get_live(&db, &repo.id, &JobConfig::default()).unwrap();
        assert!(created);

        let (second, created_again) =
            create_or_get_live(&db, &repo.id, &JobConfig::default()).unwrap();
        assert!(!created_again);
        assert_eq!(first.id, second.id);
        assert_eq!(count_by_status(&db, SyncJobStatus::Pending).unwrap(), 1);
    }

    #[test]
    fn test_create_after_terminal_job_creates_new() {
        let (db, repo) = test_db();
        insert(&db, &job_with_status(&repo.id, SyncJobStatus::Failed)).unwrap();

        let (_, created) = create_or_get_live(&db, &repo.id, &JobConfig::default()).unwrap();
        assert!(created);
        assert_eq!(list_for_repo(&db, &repo.id).unwrap().len(), 2);
    }

    #[test]
    fn test_claim_only_once() {
        let (db, repo) = test_db();
        let job = RepoSyncJob::pending(&repo.id, JobConfig::default());
        insert(&db, &job).unwrap();

        assert!(claim(&db, &job.id, Utc::now()).unwrap());
        assert!(!claim(&db, &job.id, Utc::now()).unwrap());

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, SyncJobStatus::FetchingTree);
        assert!(found.started_at.is_some());
    }

    #[test]
    fn test_terminal_rows_are_immutable() {
        let (db, repo) = test_db();
        let job = job_with_status(&repo.id, SyncJobStatus::Completed);
        insert(&db, &job).unwrap();

        let counters = JobCounters {
            processed: 9,
            skipped: 0,
            failed: 0,
        };
        assert!(!claim(&db, &job.id, Utc::now()).unwrap());
        assert!(!start_processing(&db, &job.id, 9).unwrap());
        assert!(!checkpoint(&db, &job.id, &counters).unwrap());
        assert!(!complete(&db, &job.id, &counters, None, Utc::now()).unwrap());
        assert!(!fail(&db, &job.id, "boom", Utc::now()).unwrap());
        assert_eq!(reset_in_flight(&db, Utc::now()).unwrap(), 0);

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, SyncJobStatus::Completed);
        assert_eq!(found.processed_files, 0);
        assert!(found.error.is_none());
    }

    #[test]
    fn test_full_happy_path_transitions() {
        let (db, repo) = test_db();
        let job = RepoSyncJob::pending(&repo.id, JobConfig::default());
        insert(&db, &job).unwrap();

        assert!(claim(&db, &job.id, Utc::now()).unwrap());
        assert!(start_processing(&db, &job.id, 3).unwrap());
        let counters = JobCounters {
            processed: 3,
            skipped: 1,
            failed: 0,
        };
        assert!(checkpoint(&db, &job.id, &counters).unwrap());
        assert!(complete(&db, &job.id, &counters, Some("deadbeef"), Utc::now()).unwrap());

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, SyncJobStatus::Completed);
        assert_eq!(found.total_files, 3);
        assert_eq!(found.counters(), counters);
        assert_eq!(found.commit_sha.as_deref(), Some("deadbeef"));
        assert!(found.completed_at.is_some());
    }

    #[test]
    fn test_reset_in_flight_zeroes_progress() {
        let (db, repo) = test_db();
        let job = RepoSyncJob::pending(&repo.id, JobConfig::default());
        insert(&db, &job).unwrap();
        claim(&db, &job.id, Utc::now()).unwrap();
        start_processing(&db, &job.id, 10).unwrap();
        checkpoint(
            &db,
            &job.id,
            &JobCounters {
                processed: 4,
                skipped: 1,
                failed: 1,
            },
        )
        .unwrap();

        assert_eq!(reset_in_flight(&db, Utc::now()).unwrap(), 1);
        assert_eq!(reset_in_flight(&db, Utc::now()).unwrap(), 0);

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, SyncJobStatus::Pending);
        assert_eq!(found.total_files, 0);
        assert_eq!(found.counters(), JobCounters::default());
        assert!(found.started_at.is_none());
        assert_eq!(found.error.as_deref(), Some(RECOVERED_MARKER));
    }

    #[test]
    fn test_cancel_pending_before_cutoff() {
        let (db, repo) = test_db();
        let now = Utc::now();

        let mut old = RepoSyncJob::pending(&repo.id, JobConfig::default());
        old.created_at = now - chrono::Duration::minutes(90);
        old.updated_at = old.created_at;
        insert(&db, &old).unwrap();

        let other_repo = Repo::new("acme/gears");
        repo_repo::insert(&db, &other_repo).unwrap();
        let fresh = RepoSyncJob::pending(&other_repo.id, JobConfig::default());
        insert(&db, &fresh).unwrap();

        let cancelled =
            cancel_pending_before(&db, now - chrono::Duration::minutes(60), "stale", now).unwrap();
        assert_eq!(cancelled, vec![old.id.clone()]);

        let old = find_by_id(&db, &old.id).unwrap().unwrap();
        assert_eq!(old.status, SyncJobStatus::Cancelled);
        assert_eq!(old.error.as_deref(), Some("stale"));
        let fresh = find_by_id(&db, &fresh.id).unwrap().unwrap();
        assert_eq!(fresh.status, SyncJobStatus::Pending);
    }

    #[test]
    fn test_recovered_job_restarts_pending_clock() {
        let (db, repo) = test_db();
        let now = Utc::now();

        let mut job = RepoSyncJob::pending(&repo.id, JobConfig::default());
        job.created_at = now - chrono::Duration::minutes(90);
        job.updated_at = job.created_at;
        insert(&db, &job).unwrap();
        claim(&db, &job.id, now - chrono::Duration::minutes(85)).unwrap();
        reset_in_flight(&db, now).unwrap();

        let cancelled =
            cancel_pending_before(&db, now - chrono::Duration::minutes(60), "stale", now).unwrap();
        assert!(cancelled.is_empty());
        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, SyncJobStatus::Pending);
    }

    #[test]
    fn test_corrupt_status_is_reported() {
        let (db, repo) = test_db();
        let job = RepoSyncJob::pending(&repo.id, JobConfig::default());
        insert(&db, &job).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE repo_sync_jobs SET status = 'running' WHERE id = ?1",
                params![job.id],
            )?;
            Ok(())
        })
        .unwrap();

        let err = find_by_id(&db, &job.id).unwrap_err();
        assert!(matches!(err, DatabaseError::CorruptRow { column: "status", .. }));
    }
}
