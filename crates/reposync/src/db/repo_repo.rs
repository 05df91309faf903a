//! Repo repository: the externally owned `repos` rows the engine reads
//! and advances after a successful sync.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::Repo;

struct RepoRow {
    id: String,
    full_name: String,
    default_branch: Option<String>,
    last_commit_sha: Option<String>,
    last_indexed: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RepoRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            full_name: row.get("full_name")?,
            default_branch: row.get("default_branch")?,
            last_commit_sha: row.get("last_commit_sha")?,
            last_indexed: row.get("last_indexed")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_repo(self) -> Result<Repo, DatabaseError> {
        Ok(Repo {
            last_indexed: parse_optional_timestamp(&self.id, "last_indexed", self.last_indexed)?,
            created_at: parse_timestamp(&self.id, "created_at", &self.created_at)?,
            updated_at: parse_timestamp(&self.id, "updated_at", &self.updated_at)?,
            id: self.id,
            full_name: self.full_name,
            default_branch: self.default_branch,
            last_commit_sha: self.last_commit_sha,
        })
    }
}

/// Inserts a new repo row.
pub fn insert(db: &Database, repo: &Repo) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO repos (id, full_name, default_branch, last_commit_sha, last_indexed,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                repo.id,
                repo.full_name,
                repo.default_branch,
                repo.last_commit_sha,
                repo.last_indexed.map(format_timestamp),
                format_timestamp(repo.created_at),
                format_timestamp(repo.updated_at),
            ],
        )?;
        Ok(())
    })
}

/// Finds a repo by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Repo>, DatabaseError> {
    let row = db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM repos WHERE id = ?1",
                params![id],
                RepoRow::from_row,
            )
            .optional()?)
    })?;
    row.map(RepoRow::into_repo).transpose()
}

/// Finds a repo by its `owner/name`.
pub fn find_by_full_name(db: &Database, full_name: &str) -> Result<Option<Repo>, DatabaseError> {
    let row = db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM repos WHERE full_name = ?1",
                params![full_name],
                RepoRow::from_row,
            )
            .optional()?)
    })?;
    row.map(RepoRow::into_repo).transpose()
}

/// Stores a re-detected default branch.
pub fn update_default_branch(db: &Database, id: &str, branch: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE repos SET default_branch = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, branch, format_timestamp(Utc::now())],
        )?;
        Ok(())
    })
}

/// Records a completed sync: the head commit it reached and when.
pub fn record_sync(
    db: &Database,
    id: &str,
    commit_sha: Option<&str>,
    indexed_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE repos SET last_commit_sha = COALESCE(?2, last_commit_sha),
             last_indexed = ?3, updated_at = ?3 WHERE id = ?1",
            params![id, commit_sha, format_timestamp(indexed_at)],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let repo = Repo::new("acme/widgets");
        insert(&db, &repo).unwrap();

        let found = find_by_id(&db, &repo.id).unwrap().unwrap();
        assert_eq!(found.full_name, "acme/widgets");
        assert!(found.last_commit_sha.is_none());

        let by_name = find_by_full_name(&db, "acme/widgets").unwrap().unwrap();
        assert_eq!(by_name.id, repo.id);
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_update_default_branch() {
        let db = test_db();
        let repo = Repo::new("acme/widgets");
        insert(&db, &repo).unwrap();

        update_default_branch(&db, &repo.id, "develop").unwrap();
        let found = find_by_id(&db, &repo.id).unwrap().unwrap();
        assert_eq!(found.default_branch.as_deref(), Some("develop"));
    }

    #[test]
    fn test_record_sync_keeps_sha_when_none() {
        let db = test_db();
        let repo = Repo::new("acme/widgets");
        insert(&db, &repo).unwrap();

        record_sync(&db, &repo.id, Some("abc123"), Utc::now()).unwrap();
        record_sync(&db, &repo.id, None, Utc::now()).unwrap();

        let found = find_by_id(&db, &repo.id).unwrap().unwrap();
        assert_eq!(found.last_commit_sha.as_deref(), Some("abc123"));
        assert!(found.last_indexed.is_some());
    }
}
