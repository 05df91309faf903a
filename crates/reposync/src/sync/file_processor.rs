use crate::model::{FileJobStatus, FileSyncJob, SkipReason};
use crate::source::{FetchedFile, RepoContext, SourceProvider};

use super::classifier::Classifier;

/// Result of processing one file. The orchestrator records it; the
/// processor never writes ledger rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Content(String),
    Skipped(SkipReason),
    Failed(String),
}

impl FileOutcome {
    pub fn status(&self) -> FileJobStatus {
        match self {
            FileOutcome::Content(_) => FileJobStatus::Completed,
            FileOutcome::Skipped(_) => FileJobStatus::Skipped,
            FileOutcome::Failed(_) => FileJobStatus::Failed,
        }
    }
}

/// Cap on content fetches actually issued within one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentBudget {
    limit: Option<usize>,
    spent: usize,
}

impl ContentBudget {
    pub fn new(limit: Option<usize>) -> Self {
        Self { limit, spent: 0 }
    }

    /// Reserves one fetch. Returns false once the limit is reached.
    pub fn try_spend(&mut self) -> bool {
        if self.limit.is_some_and(|limit| self.spent >= limit) {
            return false;
        }
        self.spent += 1;
        true
    }

    pub fn spent(&self) -> usize {
        self.spent
    }
}

/// Fetches or skips file content for one job.
pub struct FileProcessor<'a> {
    source: &'a dyn SourceProvider,
    ctx: &'a RepoContext,
    classifier: Classifier,
    skip_content: bool,
    budget: ContentBudget,
}

impl<'a> FileProcessor<'a> {
    pub fn new(
        source: &'a dyn SourceProvider,
        ctx: &'a RepoContext,
        classifier: Classifier,
        skip_content: bool,
        max_content_files: Option<usize>,
    ) -> Self {
        Self {
            source,
            ctx,
            classifier,
            skip_content,
            budget: ContentBudget::new(max_content_files),
        }
    }

    pub fn budget(&self) -> ContentBudget {
        self.budget
    }

    pub async fn process(&mut self, file: &FileSyncJob) -> FileOutcome {
        let verdict = self.classifier.classify(&file.path, file.size);
        if let Some(reason) = verdict.reason {
            return FileOutcome::Skipped(reason);
        }

        if self.skip_content {
            return FileOutcome::Skipped(SkipReason::ContentDisabled);
        }

        // Only files that would really hit the network draw from the budget.
        if !self.budget.try_spend() {
            return FileOutcome::Skipped(SkipReason::ContentBudgetExhausted);
        }

        match self.source.fetch_file(self.ctx, &file.path, &file.sha).await {
            Ok(FetchedFile::Content(content)) => FileOutcome::Content(content),
            Ok(FetchedFile::Skipped(reason)) => FileOutcome::Skipped(SkipReason::Upstream(reason)),
            Err(e) => FileOutcome::Failed(e.to_string()),
        }
    }
}
