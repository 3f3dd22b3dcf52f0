//! Execution error taxonomy for the task executor.
//!
//! Every step of a delivery returns `Result<_, ExecutionError>`; the first
//! error short-circuits the delivery and is folded into the task's state at
//! the executor boundary. Nothing here ever propagates out of a worker.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::SYSTEM_ERROR_MESSAGE;
use crate::engine::{EngineError, PreparationError};
use crate::logging::log_error;
use crate::storage::{ArtifactError, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing records or ligand without any representation
    Input,
    /// Ligand structure could not be generated or converted
    Preparation,
    /// Receptor or prepared ligand artifact missing
    Resource,
    /// External engine crashed, exited non-zero or produced garbage
    Engine,
    /// Soft time limit exceeded
    Timeout,
    /// Delivery revoked by a cancel request
    Cancelled,
    /// Anything unexpected: store failures, panics, I/O
    System,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Preparation => "preparation",
            Self::Resource => "resource",
            Self::Engine => "engine",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::System => "system",
        }
    }

    /// Whether the dispatch layer may redeliver after this kind of failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Resource | Self::Engine | Self::Timeout | Self::System
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Input, message)
    }

    pub fn preparation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Preparation, message)
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resource, message)
    }

    /// Unexpected failure. `detail` is logged; the task only ever sees
    /// [`SYSTEM_ERROR_MESSAGE`].
    pub fn system(detail: impl fmt::Display) -> Self {
        log_error("task_executor", "system_error", &detail.to_string(), None);
        Self::new(ErrorKind::System, SYSTEM_ERROR_MESSAGE)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Message cut to at most `max_chars` characters
    pub fn truncated(&self, max_chars: usize) -> String {
        truncate_chars(&self.message, max_chars)
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

impl From<StoreError> for ExecutionError {
    fn from(error: StoreError) -> Self {
        Self::system(error)
    }
}

impl From<ArtifactError> for ExecutionError {
    fn from(error: ArtifactError) -> Self {
        match error {
            ArtifactError::Io { .. } => Self::system(error),
            other => Self::resource(other.to_string()),
        }
    }
}

impl From<PreparationError> for ExecutionError {
    fn from(error: PreparationError) -> Self {
        match error {
            PreparationError::Cancelled => Self::new(ErrorKind::Cancelled, error.to_string()),
            other => Self::preparation(other.to_string()),
        }
    }
}

impl From<EngineError> for ExecutionError {
    fn from(error: EngineError) -> Self {
        let kind = match &error {
            EngineError::MissingInput(_) => ErrorKind::Resource,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::Spawn { .. }
            | EngineError::Process { .. }
            | EngineError::Output(_)
            | EngineError::Io(_) => ErrorKind::Engine,
        };
        Self::new(kind, error.to_string())
    }
}

pub type StepResult<T> = Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(!ErrorKind::Input.is_retryable());
        assert!(!ErrorKind::Preparation.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
        assert!(ErrorKind::Resource.is_retryable());
        assert!(ErrorKind::Engine.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::System.is_retryable());
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ångström", 3), "ång");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_engine_errors_map_to_kinds() {
        let err: ExecutionError = EngineError::MissingInput("ligand".into()).into();
        assert_eq!(err.kind, ErrorKind::Resource);
        let err: ExecutionError = EngineError::Process {
            status: "exit status: 1".into(),
            stderr: "segfault".into(),
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Engine);
        assert!(err.message.contains("segfault"));
    }

    #[test]
    fn test_system_errors_hide_their_detail() {
        let err: ExecutionError =
            StoreError::Database("password authentication failed for user \"docking\"".into()).into();
        assert_eq!(err.kind, ErrorKind::System);
        assert_eq!(err.message, SYSTEM_ERROR_MESSAGE);

        let err: ExecutionError = ArtifactError::Io {
            path: "/srv/objects/logs/t.txt".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        }
        .into();
        assert_eq!(err.message, SYSTEM_ERROR_MESSAGE);

        let err: ExecutionError = ArtifactError::PathEscape {
            path: "../x".into(),
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Resource);
    }
}
