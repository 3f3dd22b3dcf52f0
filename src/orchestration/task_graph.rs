//! # Task Graph Builder
//!
//! Expands a submission into persisted work: one [`Run`] per ligand and one
//! [`Task`] per (protein × conformer) pair. Everything that can be rejected
//! is checked before the first write, so input errors never leave partial
//! runs behind and are never enqueued. A batch and all of its runs are
//! written in one store call.

use std::sync::Arc;

use uuid::Uuid;

use super::conformer_cache::ConformerCache;
use super::presets::PresetRegistry;
use crate::constants::operations;
use crate::error::{DockingError, Result};
use crate::logging::log_run_operation;
use crate::models::{Batch, Ligand, Protein, Run, RunOptionOverrides, RunOptions, Task};
use crate::storage::Store;
use crate::validation::{validate_protein_selection, validate_run_options};

/// A run together with its freshly created tasks
#[derive(Debug, Clone)]
pub struct RunGraph {
    pub run: Run,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone)]
pub struct BatchGraph {
    pub batch: Batch,
    pub runs: Vec<RunGraph>,
}

impl BatchGraph {
    pub fn task_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.runs
            .iter()
            .flat_map(|graph| graph.tasks.iter().map(|t| t.task_id))
    }
}

#[derive(Clone)]
pub struct TaskGraphBuilder {
    store: Arc<dyn Store>,
    cache: ConformerCache,
    presets: PresetRegistry,
}

impl TaskGraphBuilder {
    pub fn new(store: Arc<dyn Store>, presets: PresetRegistry) -> Self {
        Self {
            cache: ConformerCache::new(store.clone()),
            store,
            presets,
        }
    }

    pub fn presets(&self) -> &PresetRegistry {
        &self.presets
    }

    /// Build and persist one run for `ligand` against `proteins`
    pub async fn build_run(
        &self,
        ligand: &Ligand,
        proteins: &[Protein],
        preset: &str,
        overrides: &RunOptionOverrides,
        batch_id: Option<Uuid>,
    ) -> Result<RunGraph> {
        check_proteins(proteins)?;
        let (preset, options) = self.presets.resolve(preset, overrides)?;
        validate_run_options(&options)?;

        let graph = self
            .plan(ligand, proteins, &preset, options, batch_id)
            .await?;
        self.store
            .create_run_with_tasks(&graph.run, &graph.tasks)
            .await?;

        log_run_operation(
            operations::BUILD_RUN,
            Some(graph.run.run_id),
            batch_id,
            graph.run.status.as_str(),
            Some(graph.run.total_tasks),
            Some(&preset),
        );
        Ok(graph)
    }

    /// Build and persist a batch: M ligands give M runs sharing one option set
    pub async fn build_batch(
        &self,
        name: Option<String>,
        ligands: &[Ligand],
        proteins: &[Protein],
        preset: &str,
        overrides: &RunOptionOverrides,
    ) -> Result<BatchGraph> {
        if ligands.is_empty() {
            return Err(DockingError::InvalidInput(
                "at least one ligand is required".to_string(),
            ));
        }
        check_proteins(proteins)?;
        let (preset, options) = self.presets.resolve(preset, overrides)?;
        validate_run_options(&options)?;

        let batch = Batch::new(name, preset.clone(), options);
        let mut runs = Vec::with_capacity(ligands.len());
        for ligand in ligands {
            runs.push(
                self.plan(ligand, proteins, &preset, options, Some(batch.batch_id))
                    .await?,
            );
        }

        let rows: Vec<(Run, Vec<Task>)> = runs
            .iter()
            .map(|graph| (graph.run.clone(), graph.tasks.clone()))
            .collect();
        self.store.create_batch_with_runs(&batch, &rows).await?;

        let task_count: u32 = runs.iter().map(|g| g.run.total_tasks).sum();
        log_run_operation(
            operations::BUILD_BATCH,
            None,
            Some(batch.batch_id),
            "CREATED",
            Some(task_count),
            Some(&preset),
        );
        Ok(BatchGraph { batch, runs })
    }

    /// Ensure conformers and lay out the run's tasks without persisting them
    async fn plan(
        &self,
        ligand: &Ligand,
        proteins: &[Protein],
        preset: &str,
        options: RunOptions,
        batch_id: Option<Uuid>,
    ) -> Result<RunGraph> {
        let conformers = self
            .cache
            .ensure_conformers(ligand, options.num_conformers)
            .await?;
        let selected = &conformers[..conformers.len().min(options.num_conformers as usize)];

        let mut run = Run::new(ligand.ligand_id, batch_id, preset, options);
        let mut tasks = Vec::with_capacity(proteins.len() * selected.len());
        for protein in proteins {
            for conformer in selected {
                tasks.push(Task::new(
                    run.run_id,
                    protein.protein_id.clone(),
                    Some(conformer.conformer_id),
                ));
            }
        }
        run.total_tasks = tasks.len() as u32;
        Ok(RunGraph { run, tasks })
    }
}

fn check_proteins(proteins: &[Protein]) -> Result<()> {
    let ids: Vec<String> = proteins.iter().map(|p| p.protein_id.clone()).collect();
    validate_protein_selection(&ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewLigand;
    use crate::storage::MemoryStore;

    async fn setup() -> (Arc<dyn Store>, TaskGraphBuilder, Ligand) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ligand = Ligand::from_new(NewLigand::from_smiles("ethanol", "CCO"));
        store.insert_ligand(&ligand).await.unwrap();
        let builder = TaskGraphBuilder::new(store.clone(), PresetRegistry::default());
        (store, builder, ligand)
    }

    #[tokio::test]
    async fn test_smaller_preset_reuses_prefix_of_larger_cache() {
        let (store, builder, ligand) = setup().await;
        let proteins = vec![Protein::new("P1", "Kinase", "p1/receptor.pdbqt")];

        builder
            .build_run(&ligand, &proteins, "balanced", &RunOptionOverrides::default(), None)
            .await
            .unwrap();
        let fast = builder
            .build_run(&ligand, &proteins, "fast", &RunOptionOverrides::default(), None)
            .await
            .unwrap();

        assert_eq!(fast.run.total_tasks, 5);
        assert_eq!(store.list_conformers(ligand.ligand_id).await.unwrap().len(), 15);
    }

    #[tokio::test]
    async fn test_zero_override_is_rejected_before_writes() {
        let (store, builder, ligand) = setup().await;
        let proteins = vec![Protein::new("P1", "Kinase", "p1/receptor.pdbqt")];
        let overrides = RunOptionOverrides {
            num_poses: Some(0),
            ..Default::default()
        };

        let err = builder
            .build_run(&ligand, &proteins, "fast", &overrides, None)
            .await
            .unwrap_err();
        assert!(err.is_input_error());
        assert!(store.list_conformers(ligand.ligand_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_protein_selection_is_rejected() {
        let (_, builder, ligand) = setup().await;
        let err = builder
            .build_run(&ligand, &[], "fast", &RunOptionOverrides::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DockingError::InvalidInput(_)));
    }
}
