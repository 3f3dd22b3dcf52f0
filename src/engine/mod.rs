//! # Docking Engine Collaborators
//!
//! Boundary to the external computations the orchestrator drives but does
//! not implement: the docking engine itself and ligand structure
//! preparation. Both take a [`CancellationToken`]; cancelling it stops the
//! work as soon as possible, and files already written stay where they are.

pub mod mock;
pub mod preparer;
pub mod vina;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{EngineConfig, EngineKind, PreparerKind};
use crate::models::BindingBox;

pub use mock::MockEngine;
pub use preparer::{ObabelPreparer, PlaceholderPreparer, PreparationError, StructurePreparer};
pub use vina::VinaEngine;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine input missing: {0}")]
    MissingInput(String),

    #[error("Failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Docking engine exited with {status}: {stderr}")]
    Process { status: String, stderr: String },

    #[error("Unreadable engine output: {0}")]
    Output(String),

    #[error("Engine I/O failed: {0}")]
    Io(String),

    #[error("Engine invocation cancelled")]
    Cancelled,

    #[error("Engine timed out after {0:?}")]
    Timeout(Duration),
}

/// Everything one docking invocation needs, as absolute paths
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub task_id: Uuid,
    pub ligand_id: Uuid,
    pub protein_id: String,
    pub ligand_name: String,
    pub receptor: PathBuf,
    /// Prepared ligand; `None` when the task has no conformer
    pub ligand: Option<PathBuf>,
    pub docking_box: BindingBox,
    pub exhaustiveness: u32,
    pub num_poses: u32,
    /// Directory the engine writes poses into; created by the caller
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EngineOutput {
    /// Lower is better
    pub best_score: Option<f64>,
    /// Absolute pose paths under `output_dir`
    pub pose_files: Vec<PathBuf>,
    pub metrics: serde_json::Value,
}

#[async_trait]
pub trait DockingEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn dock(
        &self,
        request: &EngineRequest,
        cancel: CancellationToken,
    ) -> Result<EngineOutput, EngineError>;
}

/// Instantiate the configured engine
pub fn engine_from_config(config: &EngineConfig) -> Arc<dyn DockingEngine> {
    match config.kind {
        EngineKind::Mock => Arc::new(MockEngine::new()),
        EngineKind::Vina => Arc::new(
            VinaEngine::new(&config.vina_binary).with_timeout(config.process_timeout()),
        ),
    }
}

/// Instantiate the configured structure preparer
pub fn preparer_from_config(config: &EngineConfig) -> Arc<dyn StructurePreparer> {
    match config.preparer {
        PreparerKind::Placeholder => Arc::new(PlaceholderPreparer),
        PreparerKind::Obabel => Arc::new(ObabelPreparer::new(&config.obabel_binary)),
    }
}
