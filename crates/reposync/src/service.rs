//! Explicitly constructed sync engine: ledger, dispatcher, worker and
//! reconciliation wired together with a start/stop lifecycle.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::broadcast::{BroadcastNotifier, LogBroadcaster};
use crate::config::EngineConfig;
use crate::db::{default_database_path, repo_repo, sync_job_repo, Database};
use crate::dispatch::{enqueue_sync_job, QueueDispatcher, SyncWorker};
use crate::embedding::LedgerEmbeddingTrigger;
use crate::error::{ConfigError, Result, SyncError};
use crate::model::{JobConfig, RepoSyncJob, SyncJobStatus};
use crate::recovery::{ReconcileResult, ReconcileScheduler, Reconciler};
use crate::source::{CredentialResolver, SourceProvider};
use crate::sync::{Classifier, SyncOrchestrator};

pub struct SyncService {
    db: Database,
    config: EngineConfig,
    dispatcher: Arc<QueueDispatcher>,
    orchestrator: Arc<SyncOrchestrator>,
    reconciler: Arc<Reconciler>,
    worker: SyncWorker,
    scheduler: ReconcileScheduler,
    notifier: BroadcastNotifier,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncService {
    pub fn new(
        db: Database,
        config: EngineConfig,
        source: Arc<dyn SourceProvider>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        let notifier = BroadcastNotifier::default();
        let dispatcher = Arc::new(QueueDispatcher::new());

        let orchestrator = Arc::new(
            SyncOrchestrator::new(db.clone(), source, credentials)
                .with_notifier(Arc::new(notifier.clone()))
                .with_embedding_trigger(Arc::new(LedgerEmbeddingTrigger::new(db.clone())))
                .with_log_broadcaster(LogBroadcaster::default())
                .with_classifier(Classifier::new(config.classifier.max_file_size)),
        );
        let reconciler = Arc::new(Reconciler::new(
            db.clone(),
            dispatcher.clone(),
            config.recovery.stale_job_max_age_minutes,
        ));
        let worker = SyncWorker::new(
            Arc::clone(&orchestrator),
            dispatcher.clone(),
            config.worker.idle_poll(),
        );
        let scheduler =
            ReconcileScheduler::new(Arc::clone(&reconciler), config.recovery.reconcile_interval());

        Self {
            db,
            config,
            dispatcher,
            orchestrator,
            reconciler,
            worker,
            scheduler,
            notifier,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Opens the configured database (or the default one) and builds the service.
    pub fn open(
        config: EngineConfig,
        source: Arc<dyn SourceProvider>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Result<Self> {
        let path = config
            .database_path
            .clone()
            .or_else(default_database_path)
            .ok_or_else(|| ConfigError::Validation {
                message: "No database_path configured and no home directory found".to_string(),
            })?;
        let db = Database::open(&path)?;
        Ok(Self::new(db, config, source, credentials))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<QueueDispatcher> {
        &self.dispatcher
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn notifier(&self) -> &BroadcastNotifier {
        &self.notifier
    }

    pub fn logs(&self) -> &LogBroadcaster {
        self.orchestrator.log_broadcaster()
    }

    /// Returns the live job for the repo, creating and announcing a PENDING
    /// one if there is none. Uses the configured default job knobs when
    /// `job_config` is `None`.
    pub async fn request_sync(
        &self,
        repo_id: &str,
        job_config: Option<JobConfig>,
    ) -> Result<RepoSyncJob> {
        if repo_repo::find_by_id(&self.db, repo_id)?.is_none() {
            return Err(SyncError::RepoNotFound(repo_id.to_string()));
        }

        let job_config = job_config.unwrap_or_else(|| self.config.default_job.clone());
        let (job, created) = sync_job_repo::create_or_get_live(&self.db, repo_id, &job_config)?;
        if created {
            log::info!("Created sync job {} for repo {}", job.id, repo_id);
        } else {
            log::info!("Sync job {} already live for repo {} ({})", job.id, repo_id, job.status);
        }

        if job.status == SyncJobStatus::Pending {
            enqueue_sync_job(self.dispatcher.as_ref(), &job).await?;
        }
        Ok(job)
    }

    /// Runs the startup reconciliation pass, then spawns the worker and the
    /// periodic scheduler.
    pub async fn start(&self) -> Result<ReconcileResult> {
        let startup = self.reconciler.startup().await?;
        log::info!(
            "Startup reconcile: {:?} recovered, {} cancelled, {} requeued",
            startup.recovered,
            startup.cancelled.len(),
            startup.requeued
        );

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.push(self.worker.start());
        handles.push(self.scheduler.start());
        Ok(startup)
    }

    /// Stops the worker and scheduler and waits for them to exit. The
    /// worker finishes the job it is running first.
    pub async fn stop(&self) {
        self.worker.stop();
        self.scheduler.stop();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Background task ended abnormally: {}", e);
            }
        }
        log::info!("Sync service stopped");
    }
}
