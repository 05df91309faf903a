//! Source provider seam.
//!
//! Everything the engine needs from the upstream host goes through these
//! traits: resolving credentials, reading the default branch, enumerating a
//! tree, comparing two commits and fetching one blob. The network client and
//! its wire format live outside this crate.

pub mod error;
pub mod memory;
pub mod types;

use async_trait::async_trait;

use crate::model::Repo;

pub use error::SourceError;
pub use memory::{blob_sha, InMemorySource, StaticCredentials};
pub use types::{CompareResult, FetchedFile, RepoContext, Tree, TreeEntry};

/// Read access to one upstream host.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Current default branch of the repository.
    async fn default_branch(&self, ctx: &RepoContext) -> Result<String, SourceError>;

    /// Every blob at the tip of `branch`.
    ///
    /// Returns [`SourceError::EmptyRepository`] when there is nothing to enumerate.
    async fn fetch_tree(&self, ctx: &RepoContext, branch: &str) -> Result<Tree, SourceError>;

    /// Changes between `base_sha` and the tip of `branch`.
    ///
    /// `Ok(None)` means the provider cannot diff (unknown base, force push,
    /// too many changes) and the caller should enumerate the full tree.
    async fn compare_commits(
        &self,
        ctx: &RepoContext,
        base_sha: &str,
        branch: &str,
    ) -> Result<Option<CompareResult>, SourceError>;

    /// Content of one blob.
    async fn fetch_file(
        &self,
        ctx: &RepoContext,
        path: &str,
        sha: &str,
    ) -> Result<FetchedFile, SourceError>;
}

/// Maps a repository to the installation that grants access to it.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, repo: &Repo) -> Option<u64>;
}
