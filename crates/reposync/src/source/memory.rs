//! In-process source provider backed by scripted commits.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    CompareResult, CredentialResolver, FetchedFile, RepoContext, SourceError, SourceProvider,
    Tree, TreeEntry,
};
use crate::model::Repo;

#[derive(Default)]
struct SourceState {
    default_branch: String,
    branch_unavailable: bool,
    compare_unavailable: bool,
    commits: HashMap<String, Vec<TreeEntry>>,
    head: Option<String>,
    blobs: HashMap<String, String>,
    failing_paths: HashMap<String, SourceError>,
    upstream_skips: HashMap<String, String>,
    fetched: Vec<String>,
    tree_fetches: usize,
}

/// A [`SourceProvider`] whose history is scripted by the caller.
///
/// Each pushed commit replaces the branch tip. Blob shas are derived from
/// content so unchanged files keep their sha across commits.
pub struct InMemorySource {
    state: Mutex<SourceState>,
}

/// Content-derived blob id.
pub fn blob_sha(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl InMemorySource {
    /// Creates an empty repository whose default branch is `default_branch`.
    pub fn new(default_branch: &str) -> Self {
        Self {
            state: Mutex::new(SourceState {
                default_branch: default_branch.to_string(),
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pushes a commit whose tree holds exactly `files` as `(path, content)`.
    pub fn push_commit(&self, commit_sha: &str, files: &[(&str, &str)]) {
        let mut state = self.state();
        let entries = files
            .iter()
            .map(|(path, content)| {
                let sha = blob_sha(content);
                state.blobs.insert(sha.clone(), content.to_string());
                TreeEntry::new(*path, sha, content.len() as u64)
            })
            .collect();
        state.commits.insert(commit_sha.to_string(), entries);
        state.head = Some(commit_sha.to_string());
    }

    /// Pushes a commit from raw entries. Entries without registered content
    /// fail with `NotFound` when fetched.
    pub fn push_entries(&self, commit_sha: &str, entries: Vec<TreeEntry>) {
        let mut state = self.state();
        state.commits.insert(commit_sha.to_string(), entries);
        state.head = Some(commit_sha.to_string());
    }

    pub fn set_default_branch(&self, branch: &str) {
        self.state().default_branch = branch.to_string();
    }

    /// Makes `default_branch` fail with a network error.
    pub fn set_branch_unavailable(&self, unavailable: bool) {
        self.state().branch_unavailable = unavailable;
    }

    /// Makes `compare_commits` report that it cannot diff.
    pub fn set_compare_unavailable(&self, unavailable: bool) {
        self.state().compare_unavailable = unavailable;
    }

    /// Makes every fetch of `path` fail with `error`.
    pub fn fail_path(&self, path: &str, error: SourceError) {
        self.state().failing_paths.insert(path.to_string(), error);
    }

    /// Makes every fetch of `path` come back as an upstream skip.
    pub fn skip_path(&self, path: &str, reason: &str) {
        self.state()
            .upstream_skips
            .insert(path.to_string(), reason.to_string());
    }

    /// Paths passed to `fetch_file`, in call order.
    pub fn fetched_paths(&self) -> Vec<String> {
        self.state().fetched.clone()
    }

    /// Number of full tree enumerations served.
    pub fn tree_fetches(&self) -> usize {
        self.state().tree_fetches
    }
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new("main")
    }
}

#[async_trait]
impl SourceProvider for InMemorySource {
    async fn default_branch(&self, _ctx: &RepoContext) -> Result<String, SourceError> {
        let state = self.state();
        if state.branch_unavailable {
            return Err(SourceError::Network("default branch unavailable".to_string()));
        }
        Ok(state.default_branch.clone())
    }

    async fn fetch_tree(&self, _ctx: &RepoContext, _branch: &str) -> Result<Tree, SourceError> {
        let mut state = self.state();
        state.tree_fetches += 1;
        let head = state.head.clone().ok_or(SourceError::EmptyRepository)?;
        let entries = state.commits.get(&head).cloned().unwrap_or_default();
        Ok(Tree {
            entries,
            commit_sha: head,
        })
    }

    async fn compare_commits(
        &self,
        _ctx: &RepoContext,
        base_sha: &str,
        _branch: &str,
    ) -> Result<Option<CompareResult>, SourceError> {
        let state = self.state();
        if state.compare_unavailable {
            return Ok(None);
        }
        let head = state.head.clone().ok_or(SourceError::EmptyRepository)?;
        let (Some(base), Some(tip)) = (state.commits.get(base_sha), state.commits.get(&head))
        else {
            return Ok(None);
        };

        let before: BTreeMap<&str, &TreeEntry> =
            base.iter().map(|e| (e.path.as_str(), e)).collect();
        let after: BTreeMap<&str, &TreeEntry> = tip.iter().map(|e| (e.path.as_str(), e)).collect();

        let mut result = CompareResult {
            head_commit_sha: head.clone(),
            ..Default::default()
        };
        for (path, entry) in &after {
            match before.get(path) {
                None => result.added.push((*entry).clone()),
                Some(old) if old.sha != entry.sha => result.modified.push((*entry).clone()),
                Some(_) => {}
            }
        }
        result.removed = before
            .keys()
            .filter(|path| !after.contains_key(*path))
            .map(|path| path.to_string())
            .collect();
        result.total_changes = result.added.len() + result.modified.len() + result.removed.len();
        Ok(Some(result))
    }

    async fn fetch_file(
        &self,
        _ctx: &RepoContext,
        path: &str,
        sha: &str,
    ) -> Result<FetchedFile, SourceError> {
        let mut state = self.state();
        state.fetched.push(path.to_string());
        if let Some(err) = state.failing_paths.get(path) {
            return Err(err.clone());
        }
        if let Some(reason) = state.upstream_skips.get(path) {
            return Ok(FetchedFile::Skipped(reason.clone()));
        }
        state
            .blobs
            .get(sha)
            .cloned()
            .map(FetchedFile::Content)
            .ok_or_else(|| SourceError::NotFound(format!("{}@{}", path, sha)))
    }
}

/// Credential resolver with a fixed installation table.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    by_repo: HashMap<String, u64>,
    fallback: Option<u64>,
}

impl StaticCredentials {
    /// Grants `installation_id` to every repository.
    pub fn allow_all(installation_id: u64) -> Self {
        Self {
            by_repo: HashMap::new(),
            fallback: Some(installation_id),
        }
    }

    /// Grants nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_repo(mut self, full_name: &str, installation_id: u64) -> Self {
        self.by_repo.insert(full_name.to_string(), installation_id);
        self
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(&self, repo: &Repo) -> Option<u64> {
        self.by_repo.get(&repo.full_name).copied().or(self.fallback)
    }
}
