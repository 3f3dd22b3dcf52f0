use chrono::{DateTime, Utc};

use super::errors::{StateMachineError, StateMachineResult};
use super::events::TaskEvent;
use super::states::TaskState;
use crate::models::Task;

/// Error text stored on tasks cancelled by an operator
pub const CANCELLED_BY_USER: &str = "Cancelled by user";

/// Pure transition table for docking tasks.
///
/// The machine mutates the in-memory [`Task`] only; persisting the new
/// state is the caller's job and goes through the store's guarded write so a
/// concurrent cancellation can never be overwritten.
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        task: &Task,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskState> {
        let target = match (task.status, event) {
            // A redelivery of a task that is already running is a restart of the
            // same attempt chain (at-least-once queue, crashed worker).
            (TaskState::Pending, TaskEvent::Start) => TaskState::Running,
            (TaskState::Running, TaskEvent::Start) => TaskState::Running,

            (TaskState::Running, TaskEvent::Retry(_)) => TaskState::Running,
            (TaskState::Running, TaskEvent::Succeed) => TaskState::Succeeded,
            (TaskState::Running, TaskEvent::Fail(_)) => TaskState::Failed,

            (TaskState::Pending, TaskEvent::Cancel) => TaskState::Cancelled,
            (TaskState::Running, TaskEvent::Cancel) => TaskState::Cancelled,

            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    task_id: task.task_id,
                    from,
                    event: event.event_type(),
                })
            }
        };
        Ok(target)
    }

    /// Apply an event, stamping timestamps, attempts and error text
    pub fn apply(task: &mut Task, event: TaskEvent) -> StateMachineResult<TaskState> {
        Self::apply_at(task, event, Utc::now())
    }

    pub fn apply_at(
        task: &mut Task,
        event: TaskEvent,
        now: DateTime<Utc>,
    ) -> StateMachineResult<TaskState> {
        let target = Self::determine_target_state(task, &event)?;

        match event {
            TaskEvent::Start => {
                task.attempts += 1;
                task.started_at = Some(now);
            }
            TaskEvent::Retry(message) => {
                task.error = Some(message);
            }
            TaskEvent::Succeed => {
                task.finished_at = Some(now);
                task.error = None;
            }
            TaskEvent::Fail(message) => {
                task.finished_at = Some(now);
                task.error = Some(message);
            }
            TaskEvent::Cancel => {
                task.finished_at = Some(now);
                task.error = Some(CANCELLED_BY_USER.to_string());
            }
        }

        task.status = target;
        Ok(target)
    }
}
