use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::run::RunOptions;

/// Logical grouping of runs spawned by one multi-ligand submission.
///
/// A batch has no state of its own; its status is always derived from its
/// runs. Every run in the batch carries exactly `options`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: Option<String>,
    pub preset: String,
    pub options: RunOptions,
}

impl Batch {
    pub fn new(name: Option<String>, preset: impl Into<String>, options: RunOptions) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            created_at: Utc::now(),
            name,
            preset: preset.into(),
            options,
        }
    }
}
