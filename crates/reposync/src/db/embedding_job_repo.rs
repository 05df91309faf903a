//! Embedding job ledger.
//!
//! The embedding pipeline itself lives downstream; the engine only records
//! that a repo may need embedding and resets rows stranded by a crash.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::sync_job_repo::RECOVERED_MARKER;
use super::{format_timestamp, Database, DatabaseError};

/// A pending embedding job row, as created by the sync engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingJobRow {
    pub id: String,
    pub repo_id: String,
    pub status: String,
    pub total_files: u32,
    pub processed_files: u32,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub created_at: String,
}

/// Returns the live (pending or processing) embedding job id for a repo,
/// creating a pending one if none exists. The boolean reports creation.
pub fn create_or_get_live(db: &Database, repo_id: &str) -> Result<(String, bool), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM embedding_jobs
                 WHERE repo_id = ?1 AND status IN ('pending', 'processing')
                 ORDER BY created_at ASC LIMIT 1",
                params![repo_id],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok((id, false));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());
        tx.execute(
            "INSERT INTO embedding_jobs (id, repo_id, status, created_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?3)",
            params![id, repo_id, now],
        )?;
        tx.commit()?;
        Ok((id, true))
    })
}

/// Finds an embedding job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<EmbeddingJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM embedding_jobs WHERE id = ?1",
                params![id],
                |row| {
                    Ok(EmbeddingJobRow {
                        id: row.get("id")?,
                        repo_id: row.get("repo_id")?,
                        status: row.get("status")?,
                        total_files: row.get("total_files")?,
                        processed_files: row.get("processed_files")?,
                        error: row.get("error")?,
                        started_at: row.get("started_at")?,
                        created_at: row.get("created_at")?,
                    })
                },
            )
            .optional()?)
    })
}

/// Updates only the status of an embedding job.
pub fn update_status(db: &Database, id: &str, status: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE embedding_jobs SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status, format_timestamp(Utc::now())],
        )?;
        Ok(())
    })
}

/// Returns every processing embedding job to pending with zeroed progress.
pub fn reset_in_flight(db: &Database, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "UPDATE embedding_jobs SET status = 'pending', total_files = 0, processed_files = 0,
             started_at = NULL, error = ?1, updated_at = ?2
             WHERE status = 'processing'",
            params![RECOVERED_MARKER, format_timestamp(now)],
        )?)
    })
}
