use super::states::TaskState;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while applying task events
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid state transition for task {task_id}: cannot apply '{event}' in state {from}")]
    InvalidTransition {
        task_id: Uuid,
        from: TaskState,
        event: &'static str,
    },

    #[error("Concurrent modification detected for task {task_id}: expected {expected}, found {found}")]
    ConcurrentModification {
        task_id: Uuid,
        expected: TaskState,
        found: TaskState,
    },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
