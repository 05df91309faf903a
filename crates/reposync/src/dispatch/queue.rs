//! In-process keyed FIFO dispatcher.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{Delivery, Dispatcher};
use crate::error::DispatchError;

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Delivery>,
    /// Keys enqueued and not yet acked, delivered or not.
    live: HashSet<String>,
    closed: bool,
}

/// A [`Dispatcher`] living in process memory.
///
/// Its contents die with the process. [`clear`](Self::clear) drops them on
/// demand, which is what a flushed broker looks like to the ledger.
#[derive(Default)]
pub struct QueueDispatcher {
    state: Mutex<QueueState>,
    ready: Notify,
}

impl QueueDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of entries waiting for delivery.
    pub fn pending(&self) -> usize {
        self.state().ready.len()
    }

    /// Number of keys present (waiting or delivered but not acked).
    pub fn len(&self) -> usize {
        self.state().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every entry.
    pub fn clear(&self) {
        let mut state = self.state();
        let dropped = state.live.len();
        state.ready.clear();
        state.live.clear();
        log::warn!("Dispatcher cleared, {} entries dropped", dropped);
    }

    /// Stops deliveries and wakes every waiting worker.
    pub fn close(&self) {
        self.state().closed = true;
        self.ready.notify_waiters();
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn enqueue(&self, key: &str, payload: String) -> Result<bool, DispatchError> {
        {
            let mut state = self.state();
            if state.closed {
                return Err(DispatchError::Closed);
            }
            if !state.live.insert(key.to_string()) {
                return Ok(false);
            }
            state.ready.push_back(Delivery {
                key: key.to_string(),
                payload,
            });
        }
        self.ready.notify_one();
        Ok(true)
    }

    async fn contains(&self, key: &str) -> Result<bool, DispatchError> {
        Ok(self.state().live.contains(key))
    }

    async fn next(&self) -> Option<Delivery> {
        loop {
            // Register interest before checking so a concurrent enqueue
            // between the check and the await is not missed.
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state();
                if state.closed {
                    return None;
                }
                if let Some(delivery) = state.ready.pop_front() {
                    return Some(delivery);
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, key: &str) -> Result<(), DispatchError> {
        self.state().live.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_and_presence_until_ack() {
        let queue = QueueDispatcher::new();
        assert!(queue.enqueue("a", "1".into()).await.unwrap());
        assert!(queue.enqueue("b", "2".into()).await.unwrap());
        assert!(!queue.enqueue("a", "again".into()).await.unwrap());

        let first = queue.next().await.unwrap();
        assert_eq!(first.key, "a");
        assert_eq!(queue.pending(), 1);
        assert!(queue.contains("a").await.unwrap());

        queue.ack("a").await.unwrap();
        assert!(!queue.contains("a").await.unwrap());
        assert!(queue.contains("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_forgets_everything() {
        let queue = QueueDispatcher::new();
        queue.enqueue("a", "1".into()).await.unwrap();
        queue.enqueue("b", "2".into()).await.unwrap();
        let _ = queue.next().await;

        queue.clear();
        assert!(queue.is_empty());
        assert!(!queue.contains("a").await.unwrap());
        assert!(!queue.contains("b").await.unwrap());
        assert!(queue.enqueue("a", "1".into()).await.unwrap());
    }

    #[tokio::test]
    async fn test_next_wakes_on_enqueue() {
        let queue = Arc::new(QueueDispatcher::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue("late", "x".into()).await.unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.key, "late");
    }

    #[tokio::test]
    async fn test_close_releases_waiters_and_rejects_enqueue() {
        let queue = Arc::new(QueueDispatcher::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
        assert!(matches!(
            queue.enqueue("a", "1".into()).await,
            Err(DispatchError::Closed)
        ));
    }
}
