//! Periodic reconciliation scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::reconciler::Reconciler;

/// Runs the reconciler on an interval and on manual triggers.
pub struct ReconcileScheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    trigger: broadcast::Sender<()>,
}

impl ReconcileScheduler {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        let (trigger, _) = broadcast::channel(16);
        Self {
            reconciler,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            trigger,
        }
    }

    /// Spawns the loop. The first periodic pass runs one `interval` after start;
    /// the startup pass is the caller's job.
    pub fn start(&self) -> JoinHandle<()> {
        self.shutdown.store(false, Ordering::Release);
        let reconciler = Arc::clone(&self.reconciler);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;
        let mut trigger_rx = self.trigger.subscribe();

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.tick().await; // skip immediate first tick

            loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                tokio::select! {
                    _ = interval_timer.tick() => {},
                    Ok(()) = trigger_rx.recv() => {
                        log::info!("Manual reconcile triggered");
                    },
                }

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                match reconciler.reconcile().await {
                    Ok(result) if !result.cancelled.is_empty() || result.requeued > 0 => {
                        log::info!(
                            "Reconcile: {} cancelled, {} requeued",
                            result.cancelled.len(),
                            result.requeued
                        );
                    }
                    Err(e) => log::error!("Reconcile failed: {}", e),
                    _ => {}
                }
            }
            log::debug!("Reconcile scheduler stopped");
        })
    }

    /// Requests an immediate pass.
    pub fn trigger(&self) {
        let _ = self.trigger.send(());
    }

    /// Signals the scheduler to stop and wakes it.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.trigger.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{repo_repo, sync_job_repo, Database};
    use crate::dispatch::{sync_job_key, Dispatcher, QueueDispatcher};
    use crate::model::{JobConfig, Repo, RepoSyncJob};

    #[tokio::test]
    async fn test_scheduler_shutdown() {
        let db = Database::open_in_memory().unwrap();
        let reconciler = Arc::new(Reconciler::new(db, Arc::new(QueueDispatcher::new()), 60));
        let scheduler = ReconcileScheduler::new(reconciler, Duration::from_millis(50));

        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .expect("scheduler task panicked");
    }

    #[tokio::test]
    async fn test_manual_trigger_requeues() {
        let db = Database::open_in_memory().unwrap();
        let repo = Repo::new("acme/widgets");
        repo_repo::insert(&db, &repo).unwrap();
        let job = RepoSyncJob::pending(&repo.id, JobConfig::default());
        sync_job_repo::insert(&db, &job).unwrap();

        let dispatcher = Arc::new(QueueDispatcher::new());
        let reconciler = Arc::new(Reconciler::new(db, dispatcher.clone(), 60));
        let scheduler = ReconcileScheduler::new(reconciler, Duration::from_secs(3600));
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.trigger();

        let key = sync_job_key(&job.id);
        let mut present = false;
        for _ in 0..50 {
            if dispatcher.contains(&key).await.unwrap() {
                present = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(present);

        scheduler.stop();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }
}
