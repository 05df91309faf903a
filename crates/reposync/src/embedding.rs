//! Hand-off to the downstream embedding pipeline.

use async_trait::async_trait;

use crate::db::{embedding_job_repo, Database};
use crate::error::Result;

/// Told when a repository may have files that need (re-)embedding.
///
/// The engine passes only the repo id and knows nothing else about the
/// embedding pipeline.
#[async_trait]
pub trait EmbeddingTrigger: Send + Sync {
    async fn notify_may_need_embedding(&self, repo_id: &str) -> Result<()>;
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmbeddingTrigger;

#[async_trait]
impl EmbeddingTrigger for NoopEmbeddingTrigger {
    async fn notify_may_need_embedding(&self, _repo_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Records a pending `embedding_jobs` row unless the repo already has a live one.
#[derive(Debug, Clone)]
pub struct LedgerEmbeddingTrigger {
    db: Database,
}

impl LedgerEmbeddingTrigger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EmbeddingTrigger for LedgerEmbeddingTrigger {
    async fn notify_may_need_embedding(&self, repo_id: &str) -> Result<()> {
        let (job_id, created) = embedding_job_repo::create_or_get_live(&self.db, repo_id)?;
        if created {
            log::info!("Queued embedding job {} for repo {}", job_id, repo_id);
        } else {
            log::debug!("Embedding job {} already live for repo {}", job_id, repo_id);
        }
        Ok(())
    }
}
