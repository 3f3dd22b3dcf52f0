//! # Status Aggregator
//!
//! Two-level rollup: run status from its tasks, batch status from its runs.
//! Both are recomputed from persisted child state on every trigger and every
//! read, never maintained incrementally. Recomputation is a pure function of
//! the children, so concurrent recomputes agree and a crashed worker is
//! repaired by the next read.
//!
//! Precedence, applied identically at both levels:
//!
//! | condition                                          | status      |
//! |----------------------------------------------------|-------------|
//! | no children                                        | `PENDING`   |
//! | every child succeeded                              | `SUCCEEDED` |
//! | every child terminal, at least one failed          | `FAILED`    |
//! | every child terminal, none failed, one+ cancelled  | `CANCELLED` |
//! | any child running                                  | `RUNNING`   |
//! | otherwise                                          | `PENDING`   |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::operations;
use crate::error::{DockingError, Result};
use crate::models::{Run, Task};
use crate::state_machine::{RunStatus, TaskState};
use crate::storage::{RunSummary, Store};

/// Child tallies feeding the precedence table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub cancelled: u32,
    pub running: u32,
    pub pending: u32,
}

impl StatusCounts {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a TaskState>) -> Self {
        let mut counts = Self::default();
        for state in tasks {
            counts.total += 1;
            match state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Succeeded => counts.succeeded += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn from_runs<'a>(runs: impl IntoIterator<Item = &'a RunStatus>) -> Self {
        let mut counts = Self::default();
        for status in runs {
            counts.total += 1;
            match status {
                RunStatus::Pending => counts.pending += 1,
                RunStatus::Running => counts.running += 1,
                RunStatus::Succeeded => counts.succeeded += 1,
                RunStatus::Failed => counts.failed += 1,
                RunStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn terminal(&self) -> u32 {
        self.succeeded + self.failed + self.cancelled
    }

    pub fn status(&self) -> RunStatus {
        if self.total == 0 {
            RunStatus::Pending
        } else if self.succeeded == self.total {
            RunStatus::Succeeded
        } else if self.terminal() == self.total && self.failed > 0 {
            RunStatus::Failed
        } else if self.terminal() == self.total && self.cancelled > 0 {
            RunStatus::Cancelled
        } else if self.running > 0 {
            RunStatus::Running
        } else {
            RunStatus::Pending
        }
    }
}

/// Run-level progress report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    pub run_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub status: RunStatus,
    pub total_tasks: u32,
    pub done_tasks: u32,
    pub failed_tasks: u32,
    pub cancelled_tasks: u32,
    pub running_tasks: u32,
    pub pending_tasks: u32,
    pub running_task_ids: Vec<Uuid>,
}

impl RunProgress {
    pub fn from_tasks(run: &Run, tasks: &[Task]) -> Self {
        let counts = StatusCounts::from_tasks(tasks.iter().map(|t| &t.status));
        Self {
            run_id: run.run_id,
            batch_id: run.batch_id,
            status: counts.status(),
            total_tasks: counts.total,
            done_tasks: counts.succeeded,
            failed_tasks: counts.failed,
            cancelled_tasks: counts.cancelled,
            running_tasks: counts.running,
            pending_tasks: counts.pending,
            running_task_ids: tasks
                .iter()
                .filter(|t| t.status == TaskState::Running)
                .map(|t| t.task_id)
                .collect(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            status: self.status,
            total_tasks: self.total_tasks,
            done_tasks: self.done_tasks,
            failed_tasks: self.failed_tasks,
        }
    }
}

/// Batch-level progress report with summed task counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: Uuid,
    pub status: RunStatus,
    pub total_runs: u32,
    pub done_runs: u32,
    pub failed_runs: u32,
    pub cancelled_runs: u32,
    pub running_runs: u32,
    pub total_tasks: u32,
    pub done_tasks: u32,
    pub failed_tasks: u32,
    pub cancelled_tasks: u32,
    pub runs: Vec<RunProgress>,
}

impl BatchProgress {
    pub fn from_runs(batch_id: Uuid, runs: Vec<RunProgress>) -> Self {
        let counts = StatusCounts::from_runs(runs.iter().map(|r| &r.status));
        Self {
            batch_id,
            status: counts.status(),
            total_runs: counts.total,
            done_runs: counts.succeeded,
            failed_runs: counts.failed,
            cancelled_runs: counts.cancelled,
            running_runs: counts.running,
            total_tasks: runs.iter().map(|r| r.total_tasks).sum(),
            done_tasks: runs.iter().map(|r| r.done_tasks).sum(),
            failed_tasks: runs.iter().map(|r| r.failed_tasks).sum(),
            cancelled_tasks: runs.iter().map(|r| r.cancelled_tasks).sum(),
            runs,
        }
    }
}

#[derive(Clone)]
pub struct StatusAggregator {
    store: Arc<dyn Store>,
}

impl StatusAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Recompute a run from its tasks and write back the cached counters
    pub async fn recompute_run(&self, run_id: Uuid) -> Result<RunProgress> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or_else(|| DockingError::not_found("run", run_id))?;
        self.recompute_loaded_run(&run).await
    }

    async fn recompute_loaded_run(&self, run: &Run) -> Result<RunProgress> {
        let tasks = self.store.list_tasks(run.run_id).await?;
        let progress = RunProgress::from_tasks(run, &tasks);

        let summary = progress.summary();
        let cached = RunSummary {
            status: run.status,
            total_tasks: run.total_tasks,
            done_tasks: run.done_tasks,
            failed_tasks: run.failed_tasks,
        };
        if summary != cached {
            self.store.update_run_summary(run.run_id, summary).await?;
            tracing::debug!(
                operation = operations::AGGREGATE_RUN,
                run_id = %run.run_id,
                from = %run.status,
                to = %summary.status,
                done = summary.done_tasks,
                failed = summary.failed_tasks,
                total = summary.total_tasks,
                "Run status recomputed"
            );
        }
        Ok(progress)
    }

    /// Recompute every run of a batch, then the batch itself
    pub async fn recompute_batch(&self, batch_id: Uuid) -> Result<BatchProgress> {
        self.store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| DockingError::not_found("batch", batch_id))?;

        let runs = self.store.list_runs_for_batch(batch_id).await?;
        let mut progress = Vec::with_capacity(runs.len());
        for run in &runs {
            progress.push(self.recompute_loaded_run(run).await?);
        }
        Ok(BatchProgress::from_runs(batch_id, progress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(states: &[TaskState]) -> RunStatus {
        StatusCounts::from_tasks(states.iter()).status()
    }

    #[test]
    fn test_precedence_table() {
        use TaskState::*;
        assert_eq!(status_of(&[]), RunStatus::Pending);
        assert_eq!(status_of(&[Pending, Pending]), RunStatus::Pending);
        assert_eq!(status_of(&[Succeeded, Succeeded]), RunStatus::Succeeded);
        assert_eq!(status_of(&[Succeeded, Failed]), RunStatus::Failed);
        assert_eq!(status_of(&[Succeeded, Running]), RunStatus::Running);
        assert_eq!(status_of(&[Failed, Running]), RunStatus::Running);
        assert_eq!(status_of(&[Failed, Pending]), RunStatus::Pending);
        assert_eq!(status_of(&[Cancelled, Cancelled]), RunStatus::Cancelled);
        assert_eq!(status_of(&[Succeeded, Cancelled]), RunStatus::Cancelled);
        assert_eq!(status_of(&[Failed, Cancelled]), RunStatus::Failed);
        assert_eq!(status_of(&[Cancelled, Pending]), RunStatus::Pending);
    }

    #[test]
    fn test_batch_rolls_up_run_statuses() {
        let counts = StatusCounts::from_runs(
            [RunStatus::Succeeded, RunStatus::Failed, RunStatus::Succeeded].iter(),
        );
        assert_eq!(counts.status(), RunStatus::Failed);

        let counts = StatusCounts::from_runs([RunStatus::Succeeded, RunStatus::Running].iter());
        assert_eq!(counts.status(), RunStatus::Running);
    }
}
