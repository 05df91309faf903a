//! File job ledger: the `file_sync_jobs` rows owned by one sync job.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::{FileJobStatus, FileSyncJob, SkipReason};
use crate::source::TreeEntry;

struct FileJobRow {
    id: String,
    sync_job_id: String,
    repo_id: String,
    seq: u32,
    path: String,
    sha: String,
    size: i64,
    status: String,
    skip_reason: Option<String>,
    error: Option<String>,
    processed_at: Option<String>,
    created_at: String,
}

impl FileJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            sync_job_id: row.get("sync_job_id")?,
            repo_id: row.get("repo_id")?,
            seq: row.get("seq")?,
            path: row.get("path")?,
            sha: row.get("sha")?,
            size: row.get("size")?,
            status: row.get("status")?,
            skip_reason: row.get("skip_reason")?,
            error: row.get("error")?,
            processed_at: row.get("processed_at")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_file_job(self) -> Result<FileSyncJob, DatabaseError> {
        let status = self
            .status
            .parse::<FileJobStatus>()
            .map_err(|_| DatabaseError::CorruptRow {
                id: self.id.clone(),
                column: "status",
                value: self.status.clone(),
            })?;

        Ok(FileSyncJob {
            processed_at: parse_optional_timestamp(&self.id, "processed_at", self.processed_at)?,
            created_at: parse_timestamp(&self.id, "created_at", &self.created_at)?,
            id: self.id,
            sync_job_id: self.sync_job_id,
            repo_id: self.repo_id,
            seq: self.seq,
            path: self.path,
            sha: self.sha,
            size: u64::try_from(self.size).unwrap_or(0),
            status,
            skip_reason: self.skip_reason.map(SkipReason::from),
            error: self.error,
        })
    }
}

/// Deletes every file row of a job and inserts one PENDING row per entry,
/// in entry order, inside a single transaction. Returns the row count.
pub fn replace_for_job(
    db: &Database,
    sync_job_id: &str,
    repo_id: &str,
    entries: &[TreeEntry],
) -> Result<usize, DatabaseError> {
    let now = format_timestamp(Utc::now());
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM file_sync_jobs WHERE sync_job_id = ?1",
            params![sync_job_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO file_sync_jobs (id, sync_job_id, repo_id, seq, path, sha, size,
                 status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
            )?;
            for (seq, entry) in entries.iter().enumerate() {
                stmt.execute(params![
                    uuid::Uuid::new_v4().to_string(),
                    sync_job_id,
                    repo_id,
                    seq as i64,
                    entry.path,
                    entry.sha,
                    i64::try_from(entry.size).unwrap_or(i64::MAX),
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    })
}

/// Deletes every file row of a job.
pub fn delete_for_job(db: &Database, sync_job_id: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "DELETE FROM file_sync_jobs WHERE sync_job_id = ?1",
            params![sync_job_id],
        )?)
    })
}

/// Lists a job's file rows in creation order.
pub fn list_for_job(db: &Database, sync_job_id: &str) -> Result<Vec<FileSyncJob>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT * FROM file_sync_jobs WHERE sync_job_id = ?1 ORDER BY seq ASC")?;
        let rows = stmt
            .query_map(params![sync_job_id], FileJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(FileJobRow::into_file_job).collect()
}

/// PENDING → PROCESSING.
pub fn mark_processing(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE file_sync_jobs SET status = 'processing' WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        Ok(changed == 1)
    })
}

/// PROCESSING → a terminal sub-state, with its reason or error.
pub fn finish(
    db: &Database,
    id: &str,
    status: FileJobStatus,
    skip_reason: Option<&SkipReason>,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    debug_assert!(status.is_terminal());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE file_sync_jobs SET status = ?2, skip_reason = ?3, error = ?4, processed_at = ?5
             WHERE id = ?1 AND status = 'processing'",
            params![
                id,
                status.as_str(),
                skip_reason.map(|r| r.as_str().to_string()),
                error,
                format_timestamp(now)
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Counts a job's file rows in the given sub-state.
pub fn count_by_status(
    db: &Database,
    sync_job_id: &str,
    status: FileJobStatus,
) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM file_sync_jobs WHERE sync_job_id = ?1 AND status = ?2",
            params![sync_job_id, status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Counts a job's file rows in any terminal sub-state.
pub fn count_terminal(db: &Database, sync_job_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM file_sync_jobs
             WHERE sync_job_id = ?1 AND status IN ('completed', 'skipped', 'failed')",
            params![sync_job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
