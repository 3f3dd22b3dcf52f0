//! # Task Model
//!
//! The atomic unit of dispatch and retry: one (protein, conformer) pairing
//! within a run. Status changes go through
//! [`TaskStateMachine`](crate::state_machine::TaskStateMachine).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::TaskState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub run_id: Uuid,
    pub protein_id: String,
    pub conformer_id: Option<Uuid>,
    pub status: TaskState,
    /// Deliveries received so far, incremented on every start
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Per-task log artifact, relative to the object store
    pub log_path: Option<String>,
}

impl Task {
    pub fn new(run_id: Uuid, protein_id: String, conformer_id: Option<Uuid>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            run_id,
            protein_id,
            conformer_id,
            status: TaskState::Pending,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            log_path: None,
        }
    }
}
