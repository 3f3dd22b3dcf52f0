//! [`Store`] wrapper that fails chosen operations on demand.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use docking_core::models::{Batch, Conformer, DockingResult, Ligand, Protein, Run, Task};
use docking_core::state_machine::{LigandStatus, RunStatus, TaskState};
use docking_core::storage::{MemoryStore, RunSummary, Store, StoreError, StoreResult};

/// Delegates to a [`MemoryStore`]; behaves identically until a failure is armed
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    /// operation name -> remaining injected failures
    armed: DashMap<&'static str, u32>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `operation` (a `Store` method name)
    pub fn fail_next(&self, operation: &'static str, times: u32) {
        self.armed.insert(operation, times);
    }

    pub fn task_count(&self) -> usize {
        self.inner.task_count()
    }

    fn check(&self, operation: &'static str) -> StoreResult<()> {
        if let Some(mut remaining) = self.armed.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Database(format!(
                    "connection reset during {operation}"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_ligand(&self, ligand: &Ligand) -> StoreResult<()> {
        self.check("insert_ligand")?;
        self.inner.insert_ligand(ligand).await
    }

    async fn get_ligand(&self, ligand_id: Uuid) -> StoreResult<Option<Ligand>> {
        self.check("get_ligand")?;
        self.inner.get_ligand(ligand_id).await
    }

    async fn set_ligand_status(
        &self,
        ligand_id: Uuid,
        status: LigandStatus,
        error: Option<String>,
    ) -> StoreResult<()> {
        self.check("set_ligand_status")?;
        self.inner.set_ligand_status(ligand_id, status, error).await
    }

    async fn list_conformers(&self, ligand_id: Uuid) -> StoreResult<Vec<Conformer>> {
        self.check("list_conformers")?;
        self.inner.list_conformers(ligand_id).await
    }

    async fn get_conformer(&self, conformer_id: Uuid) -> StoreResult<Option<Conformer>> {
        self.check("get_conformer")?;
        self.inner.get_conformer(conformer_id).await
    }

    async fn insert_conformers(&self, conformers: &[Conformer]) -> StoreResult<usize> {
        self.check("insert_conformers")?;
        self.inner.insert_conformers(conformers).await
    }

    async fn update_conformer(&self, conformer: &Conformer) -> StoreResult<()> {
        self.check("update_conformer")?;
        self.inner.update_conformer(conformer).await
    }

    async fn upsert_protein(&self, protein: &Protein) -> StoreResult<()> {
        self.check("upsert_protein")?;
        self.inner.upsert_protein(protein).await
    }

    async fn get_protein(&self, protein_id: &str) -> StoreResult<Option<Protein>> {
        self.check("get_protein")?;
        self.inner.get_protein(protein_id).await
    }

    async fn list_proteins(&self) -> StoreResult<Vec<Protein>> {
        self.check("list_proteins")?;
        self.inner.list_proteins().await
    }

    async fn count_proteins(&self) -> StoreResult<usize> {
        self.check("count_proteins")?;
        self.inner.count_proteins().await
    }

    async fn create_batch_with_runs(
        &self,
        batch: &Batch,
        runs: &[(Run, Vec<Task>)],
    ) -> StoreResult<()> {
        self.check("create_batch_with_runs")?;
        self.inner.create_batch_with_runs(batch, runs).await
    }

    async fn get_batch(&self, batch_id: Uuid) -> StoreResult<Option<Batch>> {
        self.check("get_batch")?;
        self.inner.get_batch(batch_id).await
    }

    async fn list_batches(&self) -> StoreResult<Vec<Batch>> {
        self.check("list_batches")?;
        self.inner.list_batches().await
    }

    async fn create_run_with_tasks(&self, run: &Run, tasks: &[Task]) -> StoreResult<()> {
        self.check("create_run_with_tasks")?;
        self.inner.create_run_with_tasks(run, tasks).await
    }

    async fn get_run(&self, run_id: Uuid) -> StoreResult<Option<Run>> {
        self.check("get_run")?;
        self.inner.get_run(run_id).await
    }

    async fn list_runs(&self, status: Option<RunStatus>) -> StoreResult<Vec<Run>> {
        self.check("list_runs")?;
        self.inner.list_runs(status).await
    }

    async fn list_runs_for_batch(&self, batch_id: Uuid) -> StoreResult<Vec<Run>> {
        self.check("list_runs_for_batch")?;
        self.inner.list_runs_for_batch(batch_id).await
    }

    async fn update_run_summary(&self, run_id: Uuid, summary: RunSummary) -> StoreResult<()> {
        self.check("update_run_summary")?;
        self.inner.update_run_summary(run_id, summary).await
    }

    async fn get_task(&self, task_id: Uuid) -> StoreResult<Option<Task>> {
        self.check("get_task")?;
        self.inner.get_task(task_id).await
    }

    async fn list_tasks(&self, run_id: Uuid) -> StoreResult<Vec<Task>> {
        self.check("list_tasks")?;
        self.inner.list_tasks(run_id).await
    }

    async fn save_task_guarded(&self, task: &Task, expected: TaskState) -> StoreResult<bool> {
        self.check("save_task_guarded")?;
        self.inner.save_task_guarded(task, expected).await
    }

    async fn complete_task(
        &self,
        task: &Task,
        result: Option<&DockingResult>,
        expected: TaskState,
    ) -> StoreResult<bool> {
        self.check("complete_task")?;
        self.inner.complete_task(task, result, expected).await
    }

    async fn get_result(&self, task_id: Uuid) -> StoreResult<Option<DockingResult>> {
        self.check("get_result")?;
        self.inner.get_result(task_id).await
    }

    async fn list_results_for_run(&self, run_id: Uuid) -> StoreResult<Vec<DockingResult>> {
        self.check("list_results_for_run")?;
        self.inner.list_results_for_run(run_id).await
    }
}
