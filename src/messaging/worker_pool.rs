//! # Worker Pool
//!
//! Pulls deliveries off the [`JobQueue`] and runs them on the
//! [`TaskExecutor`], at most `worker_concurrency` at a time. Each delivery
//! runs in its own tokio task under the hard time limit; exceeding it aborts
//! the task (child processes are killed on drop) and the failure is folded
//! into the task state as a timeout. A panicking delivery is treated the
//! same way as a system error.
//!
//! Retry decisions come back from the executor as
//! [`ExecutionOutcome::Retrying`]; the pool only schedules the redelivery.
//! A delivery that raises instead of settling (the store went away mid-way)
//! is treated as a system failure and goes through the same retry budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::message::Delivery;
use super::queue::JobQueue;
use crate::config::ExecutionConfig;
use crate::constants::operations;
use crate::error::DockingError;
use crate::logging::log_error;
use crate::orchestration::{
    DeliveryContext, Disposition, ErrorKind, ExecutionError, ExecutionOutcome, TaskExecutor,
};

/// Counters since the pool started
#[derive(Debug, Default)]
pub struct WorkerPoolStats {
    pub processed: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
    pub skipped: AtomicU64,
}

impl WorkerPoolStats {
    fn record(&self, outcome: &ExecutionOutcome) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            ExecutionOutcome::Succeeded { .. } => &self.succeeded,
            ExecutionOutcome::Failed { .. } => &self.failed,
            ExecutionOutcome::Retrying { .. } => &self.retried,
            ExecutionOutcome::Skipped { .. } | ExecutionOutcome::Superseded => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    executor: TaskExecutor,
    concurrency: usize,
    hard_timeout: Duration,
    stats: Arc<WorkerPoolStats>,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>, executor: TaskExecutor, config: &ExecutionConfig) -> Self {
        Self {
            queue,
            executor,
            concurrency: config.worker_concurrency.max(1),
            hard_timeout: config.hard_timeout(),
            stats: Arc::new(WorkerPoolStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<WorkerPoolStats> {
        self.stats.clone()
    }

    /// Dispatch deliveries until `shutdown` fires or the queue closes, then
    /// wait for executing deliveries to finish
    pub async fn run(self, shutdown: CancellationToken) {
        info!(concurrency = self.concurrency, "Worker pool started");
        let permits = Arc::new(Semaphore::new(self.concurrency));

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                delivery = self.queue.receive() => delivery,
            };

            let delivery = match delivery {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    info!("Job queue closed");
                    break;
                }
                Err(e) => {
                    log_error("worker_pool", "receive", &e.to_string(), None);
                    break;
                }
            };

            let pool = self.clone();
            tokio::spawn(async move {
                pool.process(delivery).await;
                drop(permit);
            });
        }

        // Every permit back means every delivery has been settled
        let _drained = permits.acquire_many(self.concurrency as u32).await;
        info!(
            processed = self.stats.processed(),
            "Worker pool stopped"
        );
    }

    /// Run a single delivery to completion, including retry scheduling
    pub async fn process(&self, delivery: Delivery) {
        let task_id = delivery.task_id;
        let attempt = delivery.attempt;
        let ctx = DeliveryContext::new(attempt, self.queue.begin(&delivery));

        let executor = self.executor.clone();
        let mut handle = tokio::spawn(async move { executor.execute(task_id, ctx).await });

        let outcome = match tokio::time::timeout(self.hard_timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                let error = ExecutionError::system(format!(
                    "Worker crashed on task {task_id}: {join_error}"
                ));
                self.executor.abandon(task_id, error, attempt).await
            }
            Err(_) => {
                handle.abort();
                let error = ExecutionError::new(
                    ErrorKind::Timeout,
                    format!("Hard time limit of {}s exceeded", self.hard_timeout.as_secs()),
                );
                self.executor.abandon(task_id, error, attempt).await
            }
        };
        self.queue.finish(&delivery);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => match self.recover(task_id, attempt, e).await {
                Some(outcome) => outcome,
                None => return,
            },
        };
        self.stats.record(&outcome);
        if outcome.is_terminal() {
            self.queue.forget(task_id);
        }

        if let ExecutionOutcome::Retrying {
            next_attempt,
            delay,
            ref error,
        } = outcome
        {
            debug!(task_id = %task_id, next_attempt, delay_ms = delay.as_millis() as u64, error = %error, "Scheduling redelivery");
            self.schedule_retry(task_id, next_attempt, delay).await;
        }
    }

    /// The delivery raised instead of settling, so the task may be stuck in
    /// PENDING or RUNNING. Redeliver while the retry budget lasts, then try
    /// once more to settle it as a system failure.
    async fn recover(
        &self,
        task_id: Uuid,
        attempt: u32,
        error: DockingError,
    ) -> Option<ExecutionOutcome> {
        let failure = ExecutionError::system(format!(
            "Delivery of task {task_id} attempt {attempt} raised: {error}"
        ));
        match self.executor.retry_policy().classify(&failure, attempt) {
            Disposition::Retry {
                next_attempt,
                delay,
            } => Some(ExecutionOutcome::Retrying {
                next_attempt,
                delay,
                error: failure.message,
            }),
            Disposition::Fail => match self.executor.abandon(task_id, failure, attempt).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    log_error(
                        "worker_pool",
                        operations::EXECUTE_TASK,
                        &e.to_string(),
                        Some(&format!("task_id={task_id} attempt={attempt} retries exhausted")),
                    );
                    None
                }
            },
        }
    }

    async fn schedule_retry(&self, task_id: Uuid, attempt: u32, delay: Duration) {
        if let Err(e) = self
            .queue
            .enqueue_after(Delivery::attempt(task_id, attempt), delay)
            .await
        {
            warn!(task_id = %task_id, error = %e, "Failed to schedule redelivery");
        }
    }
}
