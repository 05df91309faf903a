//! Test harness for isolated sync runs.
//!
//! Each harness owns an in-memory database with one registered repo, an
//! `InMemorySource` the test scripts commits into, and an orchestrator wired
//! to recording doubles.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use reposync::db::{file_job_repo, repo_repo, sync_job_repo};
use reposync::source::{InMemorySource, StaticCredentials};
use reposync::sync::{Classifier, SyncOrchestrator, SyncReport};
use reposync::{
    Database, EmbeddingTrigger, FileSyncJob, JobConfig, Repo, RepoSyncJob, SyncJobStatus,
    SyncNotifier, SyncProgressEvent,
};

/// Keeps every progress event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<SyncProgressEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<SyncProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, job_id: &str) -> Vec<SyncProgressEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.job_id == job_id)
            .collect()
    }
}

impl SyncNotifier for RecordingNotifier {
    fn notify(&self, event: SyncProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Keeps every repo id it was told about.
#[derive(Default)]
pub struct RecordingEmbeddingTrigger {
    calls: Mutex<Vec<String>>,
}

impl RecordingEmbeddingTrigger {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingTrigger for RecordingEmbeddingTrigger {
    async fn notify_may_need_embedding(&self, repo_id: &str) -> reposync::Result<()> {
        self.calls.lock().unwrap().push(repo_id.to_string());
        Ok(())
    }
}

pub struct TestHarness {
    pub db: Database,
    pub source: Arc<InMemorySource>,
    pub notifier: Arc<RecordingNotifier>,
    pub embedding: Arc<RecordingEmbeddingTrigger>,
    pub orchestrator: SyncOrchestrator,
    pub repo: Repo,
}

impl TestHarness {
    /// Harness whose repo has credentials and the default classifier.
    pub fn new() -> Self {
        Self::build(StaticCredentials::allow_all(42), Classifier::default())
    }

    /// Harness with a custom content size ceiling.
    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self::build(StaticCredentials::allow_all(42), Classifier::new(max_file_size))
    }

    /// Harness whose repo has no installation.
    pub fn without_credentials() -> Self {
        Self::build(StaticCredentials::none(), Classifier::default())
    }

    fn build(credentials: StaticCredentials, classifier: Classifier) -> Self {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let repo = Repo::new("acme/widgets");
        repo_repo::insert(&db, &repo).expect("Failed to insert repo");

        let source = Arc::new(InMemorySource::new("main"));
        let notifier = Arc::new(RecordingNotifier::default());
        let embedding = Arc::new(RecordingEmbeddingTrigger::default());
        let orchestrator = SyncOrchestrator::new(db.clone(), source.clone(), Arc::new(credentials))
            .with_notifier(notifier.clone())
            .with_embedding_trigger(embedding.clone())
            .with_classifier(classifier);

        Self {
            db,
            source,
            notifier,
            embedding,
            orchestrator,
            repo,
        }
    }

    /// Creates (or returns) the live job for the harness repo.
    pub fn create_job(&self, config: JobConfig) -> RepoSyncJob {
        sync_job_repo::create_or_get_live(&self.db, &self.repo.id, &config)
            .expect("Failed to create job")
            .0
    }

    /// Creates a job and executes it. Returns the reloaded job and the report.
    pub async fn sync(&self, config: JobConfig) -> (RepoSyncJob, Option<SyncReport>) {
        let job = self.create_job(config);
        let report = self
            .orchestrator
            .execute(&job.id)
            .await
            .expect("Sync failed");
        (self.job(&job.id), report)
    }

    pub fn job(&self, id: &str) -> RepoSyncJob {
        sync_job_repo::find_by_id(&self.db, id)
            .expect("Failed to load job")
            .expect("Job not found")
    }

    pub fn file_rows(&self, job_id: &str) -> Vec<FileSyncJob> {
        file_job_repo::list_for_job(&self.db, job_id).expect("Failed to list file rows")
    }

    pub fn terminal_file_count(&self, job_id: &str) -> u64 {
        file_job_repo::count_terminal(&self.db, job_id).expect("Failed to count file rows")
    }

    pub fn reload_repo(&self) -> Repo {
        repo_repo::find_by_id(&self.db, &self.repo.id)
            .expect("Failed to load repo")
            .expect("Repo not found")
    }
}

/// Checks the ledger invariant for a terminal, non-cancelled job.
pub fn assert_processed_matches_rows(harness: &TestHarness, job: &RepoSyncJob) {
    assert!(job.status.is_terminal());
    assert_ne!(job.status, SyncJobStatus::Cancelled);
    assert_eq!(
        u64::from(job.processed_files),
        harness.terminal_file_count(&job.id),
        "processedFiles must equal terminal file rows for job {}",
        job.id
    );
}

/// Polls until the job reaches `status` or `timeout` elapses.
pub async fn wait_for_status(
    db: &Database,
    job_id: &str,
    status: SyncJobStatus,
    timeout: Duration,
) -> RepoSyncJob {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = sync_job_repo::find_by_id(db, job_id)
            .expect("Failed to load job")
            .expect("Job not found");
        if job.status == status {
            return job;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "job {} stayed {} instead of reaching {}",
                job_id, job.status, status
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
