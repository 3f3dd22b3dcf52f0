//! # In-Memory Store
//!
//! Thread-safe [`Store`] backed by `DashMap` shards. Guarded writes hold the
//! task's shard lock for the compare-and-write, which gives them the same
//! atomicity a row lock gives the Postgres store.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{RunSummary, Store, StoreError, StoreResult};
use crate::models::{Batch, Conformer, DockingResult, Ligand, Protein, Run, Task};
use crate::state_machine::{LigandStatus, RunStatus, TaskState};

#[derive(Debug, Default)]
pub struct MemoryStore {
    ligands: DashMap<Uuid, Ligand>,
    /// ligand_id -> conformers ordered by idx
    conformers: DashMap<Uuid, Vec<Conformer>>,
    /// conformer_id -> ligand_id
    conformer_owner: DashMap<Uuid, Uuid>,
    proteins: DashMap<String, Protein>,
    batches: DashMap<Uuid, Batch>,
    runs: DashMap<Uuid, Run>,
    /// batch_id -> run ids in creation order
    batch_runs: DashMap<Uuid, Vec<Uuid>>,
    tasks: DashMap<Uuid, Task>,
    /// run_id -> task ids in creation order
    run_tasks: RwLock<HashMap<Uuid, Vec<Uuid>>>,
    /// task_id -> live result
    results: DashMap<Uuid, DockingResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks (for testing)
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn check_new_run(&self, run: &Run) -> StoreResult<()> {
        if self.runs.contains_key(&run.run_id) {
            return Err(StoreError::Conflict(format!(
                "run {} already exists",
                run.run_id
            )));
        }
        Ok(())
    }

    /// Tasks become visible before the run so a reader that finds the run
    /// always finds its complete task set
    fn insert_run(&self, run: &Run, tasks: &[Task]) {
        {
            let mut index = self.run_tasks.write();
            for task in tasks {
                self.tasks.insert(task.task_id, task.clone());
            }
            index.insert(run.run_id, tasks.iter().map(|t| t.task_id).collect());
        }
        self.runs.insert(run.run_id, run.clone());
    }

    fn guarded_write(
        &self,
        task: &Task,
        result: Option<&DockingResult>,
        expected: TaskState,
    ) -> StoreResult<bool> {
        let mut stored = self
            .tasks
            .get_mut(&task.task_id)
            .ok_or_else(|| StoreError::not_found("task", task.task_id))?;

        if stored.status != expected {
            return Ok(false);
        }

        if let Some(result) = result {
            self.results.insert(result.task_id, result.clone());
        }
        *stored = task.clone();
        Ok(true)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_ligand(&self, ligand: &Ligand) -> StoreResult<()> {
        if self.ligands.contains_key(&ligand.ligand_id) {
            return Err(StoreError::Conflict(format!(
                "ligand {} already exists",
                ligand.ligand_id
            )));
        }
        self.ligands.insert(ligand.ligand_id, ligand.clone());
        Ok(())
    }

    async fn get_ligand(&self, ligand_id: Uuid) -> StoreResult<Option<Ligand>> {
        Ok(self.ligands.get(&ligand_id).map(|l| l.clone()))
    }

    async fn set_ligand_status(
        &self,
        ligand_id: Uuid,
        status: LigandStatus,
        error: Option<String>,
    ) -> StoreResult<()> {
        let mut ligand = self
            .ligands
            .get_mut(&ligand_id)
            .ok_or_else(|| StoreError::not_found("ligand", ligand_id))?;
        ligand.status = status;
        ligand.error = error;
        Ok(())
    }

    async fn list_conformers(&self, ligand_id: Uuid) -> StoreResult<Vec<Conformer>> {
        Ok(self
            .conformers
            .get(&ligand_id)
            .map(|c| c.clone())
            .unwrap_or_default())
    }

    async fn get_conformer(&self, conformer_id: Uuid) -> StoreResult<Option<Conformer>> {
        let Some(ligand_id) = self.conformer_owner.get(&conformer_id).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.conformers.get(&ligand_id).and_then(|conformers| {
            conformers
                .iter()
                .find(|c| c.conformer_id == conformer_id)
                .cloned()
        }))
    }

    async fn insert_conformers(&self, conformers: &[Conformer]) -> StoreResult<usize> {
        let mut inserted = 0;
        for conformer in conformers {
            let mut existing = self.conformers.entry(conformer.ligand_id).or_default();
            if existing.iter().any(|c| c.idx == conformer.idx) {
                continue;
            }
            existing.push(conformer.clone());
            existing.sort_by_key(|c| c.idx);
            self.conformer_owner
                .insert(conformer.conformer_id, conformer.ligand_id);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn update_conformer(&self, conformer: &Conformer) -> StoreResult<()> {
        let mut existing = self
            .conformers
            .get_mut(&conformer.ligand_id)
            .ok_or_else(|| StoreError::not_found("conformer", conformer.conformer_id))?;
        let slot = existing
            .iter_mut()
            .find(|c| c.conformer_id == conformer.conformer_id)
            .ok_or_else(|| StoreError::not_found("conformer", conformer.conformer_id))?;
        *slot = conformer.clone();
        Ok(())
    }

    async fn upsert_protein(&self, protein: &Protein) -> StoreResult<()> {
        self.proteins
            .insert(protein.protein_id.clone(), protein.clone());
        Ok(())
    }

    async fn get_protein(&self, protein_id: &str) -> StoreResult<Option<Protein>> {
        Ok(self.proteins.get(protein_id).map(|p| p.clone()))
    }

    async fn list_proteins(&self) -> StoreResult<Vec<Protein>> {
        let mut proteins: Vec<Protein> = self.proteins.iter().map(|p| p.clone()).collect();
        proteins.sort_by(|a, b| a.protein_id.cmp(&b.protein_id));
        Ok(proteins)
    }

    async fn count_proteins(&self) -> StoreResult<usize> {
        Ok(self.proteins.len())
    }

    async fn create_batch_with_runs(
        &self,
        batch: &Batch,
        runs: &[(Run, Vec<Task>)],
    ) -> StoreResult<()> {
        if self.batches.contains_key(&batch.batch_id) {
            return Err(StoreError::Conflict(format!(
                "batch {} already exists",
                batch.batch_id
            )));
        }
        for (run, _) in runs {
            self.check_new_run(run)?;
            if run.batch_id != Some(batch.batch_id) {
                return Err(StoreError::Conflict(format!(
                    "run {} does not belong to batch {}",
                    run.run_id, batch.batch_id
                )));
            }
        }

        // The batch becomes visible last, after all of its runs
        for (run, tasks) in runs {
            self.insert_run(run, tasks);
        }
        self.batch_runs
            .insert(batch.batch_id, runs.iter().map(|(run, _)| run.run_id).collect());
        self.batches.insert(batch.batch_id, batch.clone());
        Ok(())
    }

    async fn get_batch(&self, batch_id: Uuid) -> StoreResult<Option<Batch>> {
        Ok(self.batches.get(&batch_id).map(|b| b.clone()))
    }

    async fn list_batches(&self) -> StoreResult<Vec<Batch>> {
        let mut batches: Vec<Batch> = self.batches.iter().map(|b| b.clone()).collect();
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(batches)
    }

    async fn create_run_with_tasks(&self, run: &Run, tasks: &[Task]) -> StoreResult<()> {
        self.check_new_run(run)?;
        if let Some(batch_id) = run.batch_id {
            if !self.batches.contains_key(&batch_id) {
                return Err(StoreError::not_found("batch", batch_id));
            }
        }

        self.insert_run(run, tasks);
        if let Some(batch_id) = run.batch_id {
            self.batch_runs.entry(batch_id).or_default().push(run.run_id);
        }
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> StoreResult<Option<Run>> {
        Ok(self.runs.get(&run_id).map(|r| r.clone()))
    }

    async fn list_runs(&self, status: Option<RunStatus>) -> StoreResult<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .iter()
            .filter(|run| status.map_or(true, |wanted| run.status == wanted))
            .map(|run| run.clone())
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn list_runs_for_batch(&self, batch_id: Uuid) -> StoreResult<Vec<Run>> {
        let run_ids = self
            .batch_runs
            .get(&batch_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        Ok(run_ids
            .iter()
            .filter_map(|id| self.runs.get(id).map(|r| r.clone()))
            .collect())
    }

    async fn update_run_summary(&self, run_id: Uuid, summary: RunSummary) -> StoreResult<()> {
        let mut run = self
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| StoreError::not_found("run", run_id))?;
        run.status = summary.status;
        run.total_tasks = summary.total_tasks;
        run.done_tasks = summary.done_tasks;
        run.failed_tasks = summary.failed_tasks;
        Ok(())
    }

    async fn get_task(&self, task_id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.tasks.get(&task_id).map(|t| t.clone()))
    }

    async fn list_tasks(&self, run_id: Uuid) -> StoreResult<Vec<Task>> {
        let task_ids = self.run_tasks.read().get(&run_id).cloned().unwrap_or_default();
        Ok(task_ids
            .iter()
            .filter_map(|id| self.tasks.get(id).map(|t| t.clone()))
            .collect())
    }

    async fn save_task_guarded(&self, task: &Task, expected: TaskState) -> StoreResult<bool> {
        self.guarded_write(task, None, expected)
    }

    async fn complete_task(
        &self,
        task: &Task,
        result: Option<&DockingResult>,
        expected: TaskState,
    ) -> StoreResult<bool> {
        self.guarded_write(task, result, expected)
    }

    async fn get_result(&self, task_id: Uuid) -> StoreResult<Option<DockingResult>> {
        Ok(self.results.get(&task_id).map(|r| r.clone()))
    }

    async fn list_results_for_run(&self, run_id: Uuid) -> StoreResult<Vec<DockingResult>> {
        let task_ids = self.run_tasks.read().get(&run_id).cloned().unwrap_or_default();
        Ok(task_ids
            .iter()
            .filter_map(|id| self.results.get(id).map(|r| r.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunOptions;

    fn options() -> RunOptions {
        RunOptions {
            num_conformers: 2,
            exhaustiveness: 1,
            num_poses: 1,
        }
    }

    #[tokio::test]
    async fn test_insert_conformers_skips_existing_indices() {
        let store = MemoryStore::new();
        let ligand_id = Uuid::new_v4();

        let first = vec![Conformer::new(ligand_id, 0), Conformer::new(ligand_id, 1)];
        assert_eq!(store.insert_conformers(&first).await.unwrap(), 2);

        let racing = vec![Conformer::new(ligand_id, 1), Conformer::new(ligand_id, 2)];
        assert_eq!(store.insert_conformers(&racing).await.unwrap(), 1);

        let stored = store.list_conformers(ligand_id).await.unwrap();
        let indices: Vec<u32> = stored.iter().map(|c| c.idx).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(stored[1].conformer_id, first[1].conformer_id);
    }

    #[tokio::test]
    async fn test_guarded_write_rejects_stale_expectation() {
        let store = MemoryStore::new();
        let run = Run::new(Uuid::new_v4(), None, "fast", options());
        let task = Task::new(run.run_id, "P1".to_string(), None);
        store.create_run_with_tasks(&run, &[task.clone()]).await.unwrap();

        let mut cancelled = task.clone();
        cancelled.status = TaskState::Cancelled;
        assert!(store
            .save_task_guarded(&cancelled, TaskState::Pending)
            .await
            .unwrap());

        let mut finished = task.clone();
        finished.status = TaskState::Succeeded;
        let result = DockingResult::new(task.task_id, Some(-7.5), vec![], serde_json::json!({}));
        assert!(!store
            .complete_task(&finished, Some(&result), TaskState::Running)
            .await
            .unwrap());

        let stored = store.get_task(task.task_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskState::Cancelled);
        assert!(store.get_result(task.task_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_with_unknown_batch_is_rejected() {
        let store = MemoryStore::new();
        let run = Run::new(Uuid::new_v4(), Some(Uuid::new_v4()), "fast", options());
        let result = store.create_run_with_tasks(&run, &[]).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert!(store.get_run(run.run_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_with_foreign_run_writes_nothing() {
        let store = MemoryStore::new();
        let batch = Batch::new(Some("screen".to_string()), "fast", options());
        let own = Run::new(Uuid::new_v4(), Some(batch.batch_id), "fast", options());
        let own_task = Task::new(own.run_id, "P1".to_string(), None);
        let foreign = Run::new(Uuid::new_v4(), None, "fast", options());

        let result = store
            .create_batch_with_runs(
                &batch,
                &[(own.clone(), vec![own_task.clone()]), (foreign, vec![])],
            )
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert!(store.get_batch(batch.batch_id).await.unwrap().is_none());
        assert!(store.get_run(own.run_id).await.unwrap().is_none());
        assert!(store.get_task(own_task.task_id).await.unwrap().is_none());

        store
            .create_batch_with_runs(&batch, &[(own.clone(), vec![own_task])])
            .await
            .unwrap();
        assert_eq!(store.list_runs_for_batch(batch.batch_id).await.unwrap().len(), 1);
        assert_eq!(store.list_batches().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_runs_filters_by_cached_status() {
        let store = MemoryStore::new();
        let older = Run::new(Uuid::new_v4(), None, "fast", options());
        let mut newer = Run::new(Uuid::new_v4(), None, "fast", options());
        newer.created_at = older.created_at + chrono::Duration::seconds(1);
        store.create_run_with_tasks(&older, &[]).await.unwrap();
        store.create_run_with_tasks(&newer, &[]).await.unwrap();
        store
            .update_run_summary(
                older.run_id,
                RunSummary {
                    status: RunStatus::Failed,
                    total_tasks: 0,
                    done_tasks: 0,
                    failed_tasks: 0,
                },
            )
            .await
            .unwrap();

        let all = store.list_runs(None).await.unwrap();
        assert_eq!(
            all.iter().map(|r| r.run_id).collect::<Vec<_>>(),
            vec![newer.run_id, older.run_id]
        );
        let failed = store.list_runs(Some(RunStatus::Failed)).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].run_id, older.run_id);
    }
}
