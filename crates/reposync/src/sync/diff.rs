//! Work-set selection: incremental delta when possible, full tree otherwise.

use crate::source::{RepoContext, SourceError, SourceProvider, TreeEntry};

/// The work a sync attempt has to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkPlan {
    /// The repository has no commits.
    EmptyRepository,
    /// The branch tip is still the last synced commit, or nothing differs.
    Unchanged { commit_sha: String },
    /// Added and modified entries since the last synced commit, plus the
    /// paths that disappeared.
    Incremental {
        entries: Vec<TreeEntry>,
        removed: Vec<String>,
        commit_sha: String,
    },
    /// Every blob at the branch tip.
    Full {
        entries: Vec<TreeEntry>,
        commit_sha: String,
    },
}

impl WorkPlan {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkPlan::EmptyRepository => "empty",
            WorkPlan::Unchanged { .. } => "unchanged",
            WorkPlan::Incremental { .. } => "incremental",
            WorkPlan::Full { .. } => "full",
        }
    }

    pub fn commit_sha(&self) -> Option<&str> {
        match self {
            WorkPlan::EmptyRepository => None,
            WorkPlan::Unchanged { commit_sha }
            | WorkPlan::Incremental { commit_sha, .. }
            | WorkPlan::Full { commit_sha, .. } => Some(commit_sha),
        }
    }
}

/// Computes the work plan for `branch`.
///
/// With a previous commit the provider is asked for a delta first. A
/// provider that cannot diff, or fails to, degrades to a full enumeration
/// with a warning. Only a failing tree fetch is returned as an error.
pub async fn plan_work(
    source: &dyn SourceProvider,
    ctx: &RepoContext,
    branch: &str,
    last_commit_sha: Option<&str>,
) -> Result<WorkPlan, SourceError> {
    if let Some(base) = last_commit_sha {
        match source.compare_commits(ctx, base, branch).await {
            Ok(Some(delta)) if delta.total_changes == 0 => {
                let commit_sha = if delta.head_commit_sha.is_empty() {
                    base.to_string()
                } else {
                    delta.head_commit_sha
                };
                return Ok(WorkPlan::Unchanged { commit_sha });
            }
            Ok(Some(delta)) => {
                log::debug!(
                    "{}: {} added, {} modified, {} removed since {}",
                    ctx.full_name,
                    delta.added.len(),
                    delta.modified.len(),
                    delta.removed.len(),
                    base
                );
                let mut entries = delta.added;
                entries.extend(delta.modified);
                return Ok(WorkPlan::Incremental {
                    entries,
                    removed: delta.removed,
                    commit_sha: delta.head_commit_sha,
                });
            }
            Ok(None) => {
                log::warn!(
                    "{}: cannot diff from {}, falling back to full sync",
                    ctx.full_name,
                    base
                );
            }
            Err(e) if e.is_empty_repository() => return Ok(WorkPlan::EmptyRepository),
            Err(e) => {
                log::warn!(
                    "{}: commit comparison failed ({}), falling back to full sync",
                    ctx.full_name,
                    e
                );
            }
        }
    }

    match source.fetch_tree(ctx, branch).await {
        Ok(tree) => Ok(WorkPlan::Full {
            entries: tree.entries,
            commit_sha: tree.commit_sha,
        }),
        Err(e) if e.is_empty_repository() => Ok(WorkPlan::EmptyRepository),
        Err(e) => Err(e),
    }
}
