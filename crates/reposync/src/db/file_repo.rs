//! Mirror store: the locally stored copy of each repository's files.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::SkipReason;
use crate::source::TreeEntry;

/// A mirrored file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub repo_id: String,
    pub path: String,
    pub sha: String,
    pub size: u64,
    /// `None` when the content was skipped.
    pub content: Option<String>,
    pub skip_reason: Option<SkipReason>,
    pub needs_embedding: bool,
    pub updated_at: chrono::DateTime<Utc>,
}

fn stored_file_from_row(row: &Row<'_>) -> Result<(StoredFile, String), rusqlite::Error> {
    let size: i64 = row.get("size")?;
    let needs_embedding: i64 = row.get("needs_embedding")?;
    let skip_reason: Option<String> = row.get("skip_reason")?;
    Ok((
        StoredFile {
            repo_id: row.get("repo_id")?,
            path: row.get("path")?,
            sha: row.get("sha")?,
            size: u64::try_from(size).unwrap_or(0),
            content: row.get("content")?,
            skip_reason: skip_reason.map(SkipReason::from),
            needs_embedding: needs_embedding != 0,
            updated_at: Utc::now(),
        },
        row.get("updated_at")?,
    ))
}

/// Inserts or replaces the mirror record for one path.
///
/// A record with content is flagged for (re-)embedding.
pub fn upsert(
    db: &Database,
    repo_id: &str,
    entry: &TreeEntry,
    content: Option<&str>,
    skip_reason: Option<&SkipReason>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO repo_files (repo_id, path, sha, size, content, skip_reason,
             needs_embedding, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (repo_id, path) DO UPDATE SET sha = excluded.sha,
             size = excluded.size, content = excluded.content,
             skip_reason = excluded.skip_reason, needs_embedding = excluded.needs_embedding,
             updated_at = excluded.updated_at",
            params![
                repo_id,
                entry.path,
                entry.sha,
                i64::try_from(entry.size).unwrap_or(i64::MAX),
                content,
                skip_reason.map(|r| r.as_str().to_string()),
                content.is_some() as i64,
                format_timestamp(Utc::now()),
            ],
        )?;
        Ok(())
    })
}

/// Finds the mirror record for one path.
pub fn find(db: &Database, repo_id: &str, path: &str) -> Result<Option<StoredFile>, DatabaseError> {
    let found = db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM repo_files WHERE repo_id = ?1 AND path = ?2",
                params![repo_id, path],
                stored_file_from_row,
            )
            .optional()?)
    })?;

    match found {
        Some((mut file, updated_at)) => {
            file.updated_at = parse_timestamp(&file.path, "updated_at", &updated_at)?;
            Ok(Some(file))
        }
        None => Ok(None),
    }
}

/// Lists every mirrored path of a repo, sorted.
pub fn list_paths(db: &Database, repo_id: &str) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT path FROM repo_files WHERE repo_id = ?1 ORDER BY path ASC")?;
        let paths = stmt
            .query_map(params![repo_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(paths)
    })
}

/// Deletes the given paths. Returns how many records existed.
pub fn delete_paths(db: &Database, repo_id: &str, paths: &[String]) -> Result<usize, DatabaseError> {
    if paths.is_empty() {
        return Ok(0);
    }
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM repo_files WHERE repo_id = ?1 AND path = ?2")?;
            for path in paths {
                deleted += stmt.execute(params![repo_id, path])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    })
}

/// Tombstone cleanup: deletes every record whose path is not in `keep`.
pub fn delete_absent(
    db: &Database,
    repo_id: &str,
    keep: &HashSet<&str>,
) -> Result<usize, DatabaseError> {
    let stale: Vec<String> = list_paths(db, repo_id)?
        .into_iter()
        .filter(|path| !keep.contains(path.as_str()))
        .collect();
    delete_paths(db, repo_id, &stale)
}

/// Counts records whose content changed since they were last embedded.
pub fn count_needing_embedding(db: &Database, repo_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM repo_files WHERE repo_id = ?1 AND needs_embedding = 1",
            params![repo_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
