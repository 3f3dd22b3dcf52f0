//! # Job Queue
//!
//! At-least-once delivery of task ids to the worker pool, plus revocation.
//! Revoking a task drops its queued deliveries and fires the cancellation
//! token of every delivery of it that is currently executing. Executing
//! deliveries are tracked per delivery, so two overlapping deliveries of the
//! same task never share or clobber each other's token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::errors::{QueueError, QueueResult};
use super::message::Delivery;

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, delivery: Delivery) -> QueueResult<()>;

    /// Enqueue once `delay` has elapsed
    async fn enqueue_after(&self, delivery: Delivery, delay: Duration) -> QueueResult<()>;

    /// Next delivery that has not been revoked; `None` once the queue is closed
    async fn receive(&self) -> QueueResult<Option<Delivery>>;

    /// Revoke all deliveries of a task. Returns true when an executing
    /// delivery was signalled.
    fn revoke(&self, task_id: Uuid) -> bool;

    /// Register an executing delivery and hand out its cancellation token
    fn begin(&self, delivery: &Delivery) -> CancellationToken;

    fn finish(&self, delivery: &Delivery);

    /// Drop revocation state of a task that has reached a terminal state.
    /// Later deliveries of it are settled as skips by the executor.
    fn forget(&self, task_id: Uuid);
}

/// Single-process queue on a tokio channel
pub struct InMemoryJobQueue {
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: Mutex<mpsc::UnboundedReceiver<Delivery>>,
    revoked: Arc<DashSet<Uuid>>,
    /// delivery_id -> (task_id, token)
    in_flight: DashMap<Uuid, (Uuid, CancellationToken)>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            revoked: Arc::new(DashSet::new()),
            in_flight: DashMap::new(),
        }
    }

    pub fn is_revoked(&self, task_id: Uuid) -> bool {
        self.revoked.contains(&task_id)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, delivery: Delivery) -> QueueResult<()> {
        let task_id = delivery.task_id;
        self.sender.send(delivery).map_err(|e| QueueError::Enqueue {
            task_id,
            message: e.to_string(),
        })
    }

    async fn enqueue_after(&self, delivery: Delivery, delay: Duration) -> QueueResult<()> {
        if self.sender.is_closed() {
            return Err(QueueError::Closed);
        }
        let sender = self.sender.clone();
        let revoked = self.revoked.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if revoked.contains(&delivery.task_id) {
                return;
            }
            if let Err(e) = sender.send(delivery) {
                debug!(task_id = %e.0.task_id, "Delayed delivery dropped; queue closed");
            }
        });
        Ok(())
    }

    async fn receive(&self) -> QueueResult<Option<Delivery>> {
        let mut receiver = self.receiver.lock().await;
        while let Some(delivery) = receiver.recv().await {
            if self.revoked.contains(&delivery.task_id) {
                debug!(task_id = %delivery.task_id, "Revoked delivery discarded");
                continue;
            }
            return Ok(Some(delivery));
        }
        Ok(None)
    }

    fn revoke(&self, task_id: Uuid) -> bool {
        self.revoked.insert(task_id);
        let mut signalled = false;
        for entry in self.in_flight.iter() {
            let (owner, token) = entry.value();
            if *owner == task_id {
                token.cancel();
                signalled = true;
            }
        }
        signalled
    }

    fn begin(&self, delivery: &Delivery) -> CancellationToken {
        let token = CancellationToken::new();
        self.in_flight
            .insert(delivery.delivery_id, (delivery.task_id, token.clone()));
        // Checked after registering so a concurrent revoke cannot slip between
        if self.revoked.contains(&delivery.task_id) {
            token.cancel();
        }
        token
    }

    fn finish(&self, delivery: &Delivery) {
        self.in_flight.remove(&delivery.delivery_id);
    }

    fn forget(&self, task_id: Uuid) {
        self.revoked.remove(&task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_revoked_deliveries_are_skipped() {
        let queue = InMemoryJobQueue::new();
        let revoked = Uuid::new_v4();
        let kept = Uuid::new_v4();

        queue.enqueue(Delivery::new(revoked)).await.unwrap();
        queue.enqueue(Delivery::new(kept)).await.unwrap();
        assert!(!queue.revoke(revoked));

        let next = queue.receive().await.unwrap().unwrap();
        assert_eq!(next.task_id, kept);
    }

    #[tokio::test]
    async fn test_revoke_signals_executing_delivery() {
        let queue = InMemoryJobQueue::new();
        let delivery = Delivery::new(Uuid::new_v4());

        let token = queue.begin(&delivery);
        assert!(!token.is_cancelled());
        assert!(queue.revoke(delivery.task_id));
        assert!(token.is_cancelled());

        queue.finish(&delivery);
        assert_eq!(queue.in_flight(), 0);
        assert!(queue.begin(&Delivery::attempt(delivery.task_id, 2)).is_cancelled());
    }

    #[tokio::test]
    async fn test_overlapping_deliveries_keep_their_own_tokens() {
        let queue = InMemoryJobQueue::new();
        let task_id = Uuid::new_v4();
        let first = Delivery::new(task_id);
        let second = Delivery::attempt(task_id, 2);

        let first_token = queue.begin(&first);
        let second_token = queue.begin(&second);
        queue.finish(&first);
        assert_eq!(queue.in_flight(), 1);

        assert!(queue.revoke(task_id));
        assert!(second_token.is_cancelled());
        assert!(!first_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_forget_clears_revocation() {
        let queue = InMemoryJobQueue::new();
        let task_id = Uuid::new_v4();
        queue.revoke(task_id);
        assert!(queue.is_revoked(task_id));

        queue.forget(task_id);
        assert!(!queue.is_revoked(task_id));
        queue.enqueue(Delivery::new(task_id)).await.unwrap();
        assert_eq!(queue.receive().await.unwrap().unwrap().task_id, task_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_enqueue() {
        let queue = InMemoryJobQueue::new();
        let task_id = Uuid::new_v4();
        queue
            .enqueue_after(Delivery::attempt(task_id, 2), Duration::from_secs(5))
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(10), queue.receive())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(received.attempt, 2);
    }
}
