use serde::{Deserialize, Serialize};

/// Events that can trigger task state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// A worker received a delivery for the task
    Start,
    /// The delivery failed but the dispatch layer will try again
    Retry(String),
    /// Docking finished and the result was persisted
    Succeed,
    /// Final delivery failed with the given error
    Fail(String),
    /// Operator cancellation
    Cancel,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Retry(_) => "retry",
            Self::Succeed => "succeed",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Extract error message if this event carries one
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) | Self::Retry(msg) => Some(msg),
            _ => None,
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeed | Self::Fail(_) | Self::Cancel)
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
