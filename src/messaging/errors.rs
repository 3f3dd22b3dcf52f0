//! # Queue Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job queue is closed")]
    Closed,

    #[error("Failed to enqueue task {task_id}: {message}")]
    Enqueue { task_id: uuid::Uuid, message: String },

    #[error("Queue backend error: {0}")]
    Backend(String),
}

pub type QueueResult<T> = Result<T, QueueError>;
