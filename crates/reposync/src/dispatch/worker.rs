use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use super::{Delivery, Dispatcher, SyncJobMessage};
use crate::sync::SyncOrchestrator;

/// Pulls sync jobs from a [`Dispatcher`] and runs them one at a time.
pub struct SyncWorker {
    orchestrator: Arc<SyncOrchestrator>,
    dispatcher: Arc<dyn Dispatcher>,
    idle_poll: Duration,
    shutdown: Arc<AtomicBool>,
}

impl SyncWorker {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        dispatcher: Arc<dyn Dispatcher>,
        idle_poll: Duration,
    ) -> Self {
        Self {
            orchestrator,
            dispatcher,
            idle_poll,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the worker loop on the current tokio runtime.
    ///
    /// The loop re-checks the shutdown flag at least every `idle_poll`.
    pub fn start(&self) -> JoinHandle<()> {
        self.shutdown.store(false, Ordering::Release);
        let orchestrator = Arc::clone(&self.orchestrator);
        let dispatcher = Arc::clone(&self.dispatcher);
        let shutdown = Arc::clone(&self.shutdown);
        let idle_poll = self.idle_poll;

        tokio::spawn(async move {
            info!("Sync worker started");
            loop {
                if shutdown.load(Ordering::Acquire) {
                    debug!("Sync worker received shutdown signal");
                    break;
                }

                match tokio::time::timeout(idle_poll, dispatcher.next()).await {
                    Ok(Some(delivery)) => {
                        handle_delivery(&orchestrator, dispatcher.as_ref(), delivery).await
                    }
                    Ok(None) => {
                        debug!("Dispatcher closed");
                        break;
                    }
                    Err(_) => continue,
                }
            }
            info!("Sync worker stopped");
        })
    }

    /// Signals the worker to stop after its current job.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Waits up to `wait` for one delivery and handles it.
    ///
    /// Returns false if nothing arrived.
    pub async fn run_once(&self, wait: Duration) -> bool {
        match tokio::time::timeout(wait, self.dispatcher.next()).await {
            Ok(Some(delivery)) => {
                handle_delivery(&self.orchestrator, self.dispatcher.as_ref(), delivery).await;
                true
            }
            _ => false,
        }
    }
}

async fn handle_delivery(
    orchestrator: &SyncOrchestrator,
    dispatcher: &dyn Dispatcher,
    delivery: Delivery,
) {
    match delivery.decode::<SyncJobMessage>() {
        Ok(message) => match orchestrator.execute(&message.job_id).await {
            Ok(Some(report)) => info!(
                "Sync job {} done ({} plan, {}/{} files)",
                report.job_id, report.plan, report.counters.processed, report.total_files
            ),
            Ok(None) => debug!("Sync job {} skipped, not pending", message.job_id),
            Err(e) => warn!("Sync job {} ended in failure: {}", message.job_id, e),
        },
        Err(e) => error!("Dropping undecodable delivery: {}", e),
    }

    if let Err(e) = dispatcher.ack(&delivery.key).await {
        error!("Failed to ack {}: {}", delivery.key, e);
    }
}
