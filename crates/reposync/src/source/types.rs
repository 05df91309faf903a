use serde::{Deserialize, Serialize};

/// A blob in a branch tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    pub path: String,
    pub sha: String,
    pub size: u64,
}

impl TreeEntry {
    pub fn new(path: impl Into<String>, sha: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            sha: sha.into(),
            size,
        }
    }
}

/// Full enumeration of a branch tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
    pub commit_sha: String,
}

/// Delta between a previously synced commit and a branch tip.
///
/// `added` and `modified` carry full entries so the orchestrator can build
/// file rows without a second tree fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResult {
    pub added: Vec<TreeEntry>,
    pub modified: Vec<TreeEntry>,
    pub removed: Vec<String>,
    pub head_commit_sha: String,
    pub total_changes: usize,
}

/// Outcome of a content fetch that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedFile {
    Content(String),
    /// The provider declined to serve content (submodule, symlink, ...).
    Skipped(String),
}

/// Credential context a provider needs to reach one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoContext {
    pub installation_id: u64,
    pub full_name: String,
}
