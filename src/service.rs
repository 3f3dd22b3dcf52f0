//! # Docking Service
//!
//! Submission and query surface over the orchestration core. This is what
//! an HTTP layer (out of scope here) would call: every method validates
//! synchronously, writes through the [`Store`], and enqueues task ids on the
//! [`JobQueue`]. Status reads always recompute from task rows first.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;
use uuid::Uuid;

use crate::config::DockingConfig;
use crate::constants::operations;
use crate::error::{DockingError, Result};
use crate::logging::{log_run_operation, log_task_operation};
use crate::messaging::{Delivery, JobQueue};
use crate::models::{Ligand, NewLigand, Protein, Run, RunOptionOverrides, Task};
use crate::orchestration::results::{compare_scores, rank_run, summarize_batch_run};
use crate::orchestration::{
    BatchGraph, BatchProgress, BatchResults, BatchSummary, PresetRegistry, RunGraph, RunProgress,
    RunResults, StatusAggregator, TaskGraphBuilder,
};
use crate::state_machine::{RunStatus, TaskEvent, TaskStateMachine};
use crate::storage::Store;
use crate::validation::{validate_ligand_input, validate_protein_selection};

/// Guarded cancel writes retried this many times when the task keeps moving
const CANCEL_WRITE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct DockingService {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    builder: TaskGraphBuilder,
    aggregator: StatusAggregator,
}

impl DockingService {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>, presets: PresetRegistry) -> Self {
        Self {
            builder: TaskGraphBuilder::new(store.clone(), presets),
            aggregator: StatusAggregator::new(store.clone()),
            store,
            queue,
        }
    }

    pub fn from_config(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        config: &DockingConfig,
    ) -> Self {
        Self::new(store, queue, PresetRegistry::new(&config.presets))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn presets(&self) -> &PresetRegistry {
        self.builder.presets()
    }

    pub async fn create_ligand(&self, input: NewLigand) -> Result<Ligand> {
        validate_ligand_input(&input)?;
        let ligand = Ligand::from_new(input);
        self.store.insert_ligand(&ligand).await?;
        debug!(ligand_id = %ligand.ligand_id, "Ligand created");
        Ok(ligand)
    }

    pub async fn get_ligand(&self, ligand_id: Uuid) -> Result<Ligand> {
        self.store
            .get_ligand(ligand_id)
            .await?
            .ok_or_else(|| DockingError::not_found("ligand", ligand_id))
    }

    pub async fn register_protein(&self, protein: Protein) -> Result<()> {
        self.store.upsert_protein(&protein).await?;
        Ok(())
    }

    pub async fn list_proteins(&self) -> Result<Vec<Protein>> {
        Ok(self.store.list_proteins().await?)
    }

    /// Build one run and enqueue every task
    pub async fn submit_run(
        &self,
        ligand_id: Uuid,
        protein_ids: &[String],
        preset: &str,
        overrides: &RunOptionOverrides,
    ) -> Result<RunGraph> {
        validate_protein_selection(protein_ids)?;
        let ligand = self.get_ligand(ligand_id).await?;
        let proteins = self.load_proteins(protein_ids).await?;

        let graph = self
            .builder
            .build_run(&ligand, &proteins, preset, overrides, None)
            .await?;
        self.enqueue_all(graph.tasks.iter().map(|t| t.task_id)).await?;
        Ok(graph)
    }

    /// Build one run per ligand under a new batch and enqueue every task
    pub async fn submit_batch(
        &self,
        name: Option<String>,
        ligand_ids: &[Uuid],
        protein_ids: &[String],
        preset: &str,
        overrides: &RunOptionOverrides,
    ) -> Result<BatchGraph> {
        validate_protein_selection(protein_ids)?;
        let mut ligands = Vec::with_capacity(ligand_ids.len());
        for ligand_id in ligand_ids {
            ligands.push(self.get_ligand(*ligand_id).await?);
        }
        let proteins = self.load_proteins(protein_ids).await?;

        let graph = self
            .builder
            .build_batch(name, &ligands, &proteins, preset, overrides)
            .await?;
        self.enqueue_all(graph.task_ids()).await?;
        Ok(graph)
    }

    /// Runs newest first, filtered on the cached run status
    pub async fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<Run>> {
        Ok(self.store.list_runs(status).await?)
    }

    /// Batches newest first with recomputed progress, optionally only those
    /// whose derived status matches
    pub async fn list_batches(&self, status: Option<RunStatus>) -> Result<Vec<BatchSummary>> {
        let mut summaries = Vec::new();
        for batch in self.store.list_batches().await? {
            let progress = self.aggregator.recompute_batch(batch.batch_id).await?;
            if status.is_some_and(|wanted| progress.status != wanted) {
                continue;
            }
            summaries.push(BatchSummary {
                batch_id: batch.batch_id,
                created_at: batch.created_at,
                name: batch.name,
                preset: batch.preset,
                progress,
            });
        }
        Ok(summaries)
    }

    pub async fn run_status(&self, run_id: Uuid) -> Result<RunProgress> {
        self.aggregator.recompute_run(run_id).await
    }

    pub async fn batch_status(&self, batch_id: Uuid) -> Result<BatchProgress> {
        self.aggregator.recompute_batch(batch_id).await
    }

    /// Per-protein best results of a run plus the ranking by best score
    pub async fn run_results(&self, run_id: Uuid) -> Result<RunResults> {
        self.aggregator.recompute_run(run_id).await?;
        let tasks = self.store.list_tasks(run_id).await?;
        let results = self.store.list_results_for_run(run_id).await?;
        let proteins = self.protein_index().await?;
        Ok(rank_run(run_id, &tasks, &results, &proteins))
    }

    /// Batch progress plus one entry per run, best runs first
    pub async fn batch_results(&self, batch_id: Uuid) -> Result<BatchResults> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| DockingError::not_found("batch", batch_id))?;
        let progress = self.aggregator.recompute_batch(batch_id).await?;
        let proteins = self.protein_index().await?;

        let mut runs = Vec::new();
        for run in self.store.list_runs_for_batch(batch_id).await? {
            let ligand = self.store.get_ligand(run.ligand_id).await?;
            let tasks = self.store.list_tasks(run.run_id).await?;
            let results = self.store.list_results_for_run(run.run_id).await?;
            runs.push(summarize_batch_run(
                &run,
                ligand.as_ref(),
                &tasks,
                &results,
                &proteins,
            ));
        }
        runs.sort_by(|a, b| compare_scores(a.best_score, b.best_score));

        Ok(BatchResults {
            batch_id,
            name: batch.name,
            preset: batch.preset,
            progress,
            runs,
        })
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| DockingError::not_found("task", task_id))
    }

    /// Cancel a PENDING or RUNNING task: mark it CANCELLED, revoke its
    /// deliveries and recompute the run
    pub async fn cancel_task(&self, task_id: Uuid) -> Result<Task> {
        let task = self.cancel_task_record(task_id).await?;
        self.aggregator.recompute_run(task.run_id).await?;
        Ok(task)
    }

    /// Cancel every PENDING or RUNNING task of a run; returns how many were cancelled
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<u32> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| DockingError::not_found("run", run_id))?;

        let mut cancelled = 0;
        for task in self.store.list_tasks(run_id).await? {
            if !task.status.can_cancel() {
                continue;
            }
            match self.cancel_task_record(task.task_id).await {
                Ok(_) => cancelled += 1,
                // Finished between the listing and the cancel
                Err(DockingError::CannotCancel { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let progress = self.aggregator.recompute_run(run_id).await?;
        log_run_operation(
            operations::CANCEL_RUN,
            Some(run_id),
            progress.batch_id,
            progress.status.as_str(),
            Some(cancelled),
            None,
        );
        Ok(cancelled)
    }

    async fn cancel_task_record(&self, task_id: Uuid) -> Result<Task> {
        for _ in 0..CANCEL_WRITE_ATTEMPTS {
            let mut task = self.get_task(task_id).await?;
            if !task.status.can_cancel() {
                return Err(DockingError::CannotCancel {
                    task_id,
                    status: task.status,
                });
            }

            let previous = task.status;
            TaskStateMachine::apply(&mut task, TaskEvent::Cancel)?;
            if self.store.save_task_guarded(&task, previous).await? {
                let signalled = self.queue.revoke(task_id);
                log_task_operation(
                    operations::CANCEL_TASK,
                    task_id,
                    Some(task.run_id),
                    Some(&task.protein_id),
                    task.status.as_str(),
                    Some(if signalled { "running delivery signalled" } else { "queued delivery revoked" }),
                );
                return Ok(task);
            }
        }

        let task = self.get_task(task_id).await?;
        Err(DockingError::CannotCancel {
            task_id,
            status: task.status,
        })
    }

    async fn load_proteins(&self, protein_ids: &[String]) -> Result<Vec<Protein>> {
        let mut proteins = Vec::with_capacity(protein_ids.len());
        for protein_id in protein_ids {
            let protein = self
                .store
                .get_protein(protein_id)
                .await?
                .ok_or_else(|| DockingError::not_found("protein", protein_id))?;
            proteins.push(protein);
        }
        Ok(proteins)
    }

    async fn protein_index(&self) -> Result<HashMap<String, Protein>> {
        Ok(self
            .store
            .list_proteins()
            .await?
            .into_iter()
            .map(|p| (p.protein_id.clone(), p))
            .collect())
    }

    async fn enqueue_all(&self, task_ids: impl Iterator<Item = Uuid>) -> Result<()> {
        let queue = &self.queue;
        try_join_all(task_ids.map(|task_id| queue.enqueue(Delivery::new(task_id)))).await?;
        Ok(())
    }
}
