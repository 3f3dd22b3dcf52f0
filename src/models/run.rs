//! # Run Model
//!
//! One ligand evaluated against a set of proteins under one resolved option
//! set. Created atomically together with its full task set; the counters
//! and `status` are a cache the aggregator rewrites on every recomputation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::RunStatus;

/// Resolved numeric options for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunOptions {
    pub num_conformers: u32,
    pub exhaustiveness: u32,
    pub num_poses: u32,
}

/// Caller-supplied overrides, merged field by field over a preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptionOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_conformers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhaustiveness: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_poses: Option<u32>,
}

impl RunOptions {
    /// Preset defaults first, then each override that is set
    pub fn with_overrides(&self, overrides: &RunOptionOverrides) -> Self {
        Self {
            num_conformers: overrides.num_conformers.unwrap_or(self.num_conformers),
            exhaustiveness: overrides.exhaustiveness.unwrap_or(self.exhaustiveness),
            num_poses: overrides.num_poses.unwrap_or(self.num_poses),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub ligand_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub preset: String,
    pub options: RunOptions,
    pub status: RunStatus,
    pub total_tasks: u32,
    pub done_tasks: u32,
    pub failed_tasks: u32,
}

impl Run {
    pub fn new(
        ligand_id: Uuid,
        batch_id: Option<Uuid>,
        preset: impl Into<String>,
        options: RunOptions,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            ligand_id,
            batch_id,
            preset: preset.into(),
            options,
            status: RunStatus::Pending,
            total_tasks: 0,
            done_tasks: 0,
            failed_tasks: 0,
        }
    }
}
