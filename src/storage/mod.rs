//! # Storage
//!
//! Record persistence for the seven docking entities plus the artifact
//! (object) store. The orchestration layer only talks to the [`Store`]
//! trait; [`MemoryStore`] backs tests and single-process deployments,
//! [`PgStore`] backs shared deployments.
//!
//! Two operations carry concurrency contracts the executor relies on:
//!
//! - [`Store::insert_conformers`] ignores indices that already exist, so
//!   racing cache fills never produce duplicate `(ligand_id, idx)` pairs.
//! - [`Store::save_task_guarded`] and [`Store::complete_task`] only write when
//!   the stored status still matches the caller's expectation, so a worker
//!   can never overwrite a task that was cancelled underneath it.

pub mod artifacts;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Batch, Conformer, DockingResult, Ligand, Protein, Run, Task};
use crate::state_machine::{LigandStatus, RunStatus, TaskState};

pub use artifacts::{ArtifactError, ArtifactStore};
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record in {entity}: {reason}")]
    Corrupt { entity: &'static str, reason: String },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "row",
                id: "unknown".to_string(),
            },
            other => Self::Database(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Cached run counters written back by the status aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub status: RunStatus,
    pub total_tasks: u32,
    pub done_tasks: u32,
    pub failed_tasks: u32,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Ligands
    async fn insert_ligand(&self, ligand: &Ligand) -> StoreResult<()>;
    async fn get_ligand(&self, ligand_id: Uuid) -> StoreResult<Option<Ligand>>;
    async fn set_ligand_status(
        &self,
        ligand_id: Uuid,
        status: LigandStatus,
        error: Option<String>,
    ) -> StoreResult<()>;

    // Conformers
    /// Conformers of a ligand ordered by index
    async fn list_conformers(&self, ligand_id: Uuid) -> StoreResult<Vec<Conformer>>;
    async fn get_conformer(&self, conformer_id: Uuid) -> StoreResult<Option<Conformer>>;
    /// Insert conformers, skipping any whose `(ligand_id, idx)` already exists.
    /// Returns how many rows were actually inserted.
    async fn insert_conformers(&self, conformers: &[Conformer]) -> StoreResult<usize>;
    async fn update_conformer(&self, conformer: &Conformer) -> StoreResult<()>;

    // Proteins
    /// Insert or replace by `protein_id`
    async fn upsert_protein(&self, protein: &Protein) -> StoreResult<()>;
    async fn get_protein(&self, protein_id: &str) -> StoreResult<Option<Protein>>;
    async fn list_proteins(&self) -> StoreResult<Vec<Protein>>;
    async fn count_proteins(&self) -> StoreResult<usize>;

    // Batches
    /// Persist a batch with every run and task in one unit; nothing of the
    /// batch is visible unless all of it is
    async fn create_batch_with_runs(
        &self,
        batch: &Batch,
        runs: &[(Run, Vec<Task>)],
    ) -> StoreResult<()>;
    async fn get_batch(&self, batch_id: Uuid) -> StoreResult<Option<Batch>>;
    /// All batches, newest first
    async fn list_batches(&self) -> StoreResult<Vec<Batch>>;

    // Runs
    /// Persist a run together with its complete task set in one unit
    async fn create_run_with_tasks(&self, run: &Run, tasks: &[Task]) -> StoreResult<()>;
    async fn get_run(&self, run_id: Uuid) -> StoreResult<Option<Run>>;
    /// Runs newest first, optionally only those whose cached status matches
    async fn list_runs(&self, status: Option<RunStatus>) -> StoreResult<Vec<Run>>;
    async fn list_runs_for_batch(&self, batch_id: Uuid) -> StoreResult<Vec<Run>>;
    async fn update_run_summary(&self, run_id: Uuid, summary: RunSummary) -> StoreResult<()>;

    // Tasks
    async fn get_task(&self, task_id: Uuid) -> StoreResult<Option<Task>>;
    /// Tasks of a run in creation order
    async fn list_tasks(&self, run_id: Uuid) -> StoreResult<Vec<Task>>;
    /// Write `task` only if the stored status equals `expected`.
    /// Returns false (and writes nothing) otherwise.
    async fn save_task_guarded(&self, task: &Task, expected: TaskState) -> StoreResult<bool>;
    /// Guarded task write that also replaces the task's result, both or neither
    async fn complete_task(
        &self,
        task: &Task,
        result: Option<&DockingResult>,
        expected: TaskState,
    ) -> StoreResult<bool>;

    // Results
    async fn get_result(&self, task_id: Uuid) -> StoreResult<Option<DockingResult>>;
    async fn list_results_for_run(&self, run_id: Uuid) -> StoreResult<Vec<DockingResult>>;
}
