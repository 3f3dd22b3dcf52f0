use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::QueueError;
use crate::seed::SeedError;
use crate::state_machine::StateMachineError;
use crate::storage::{ArtifactError, StoreError};

/// Crate-level error returned by the submission surface and the graph builder.
///
/// Execution failures inside a worker never surface here; they are folded
/// into the task's terminal state by the executor.
#[derive(Debug, Error)]
pub enum DockingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Cannot cancel task {task_id} with status {status}")]
    CannotCancel {
        task_id: uuid::Uuid,
        status: crate::state_machine::TaskState,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Seed(#[from] SeedError),
}

impl DockingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Input errors are rejected synchronously and never reach the queue
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::UnknownPreset(_) | Self::NotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DockingError>;
