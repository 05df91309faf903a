use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mirrored repository. Only a completed sync moves `last_commit_sha`
/// and `last_indexed`; branch re-detection moves `default_branch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repo {
    pub id: String,
    /// `owner/name` on the source provider.
    pub full_name: String,
    pub default_branch: Option<String>,
    pub last_commit_sha: Option<String>,
    pub last_indexed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repo {
    /// Creates a never-synced repo record.
    pub fn new(full_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            full_name: full_name.into(),
            default_branch: None,
            last_commit_sha: None,
            last_indexed: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Cached default branch, or `main` when nothing was ever detected.
    pub fn cached_branch(&self) -> &str {
        self.default_branch.as_deref().unwrap_or("main")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_repo_has_no_sync_state() {
        let repo = Repo::new("acme/widgets");
        assert!(!repo.id.is_empty());
        assert!(repo.last_commit_sha.is_none());
        assert!(repo.last_indexed.is_none());
    }

    #[test]
    fn test_cached_branch_falls_back_to_main() {
        let mut repo = Repo::new("acme/widgets");
        assert_eq!(repo.cached_branch(), "main");
        repo.default_branch = Some("trunk".to_string());
        assert_eq!(repo.cached_branch(), "trunk");
    }
}
