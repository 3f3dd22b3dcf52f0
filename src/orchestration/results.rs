//! Result roll-up and ranking for runs and batches.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status_aggregator::BatchProgress;
use crate::models::{DockingResult, Ligand, Protein, Run, Task};
use crate::state_machine::{RunStatus, TaskState};

/// Best outcome for one protein across its conformer tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProteinResult {
    pub protein_id: String,
    pub protein_name: String,
    pub receptor_path: Option<String>,
    pub best_score: Option<f64>,
    pub pose_paths: Vec<String>,
    pub metrics: Option<serde_json::Value>,
    pub status: TaskState,
    /// First task error recorded for this protein
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    pub run_id: Uuid,
    /// In order of first appearance among the run's tasks
    pub per_protein: Vec<ProteinResult>,
    /// `per_protein` by best score ascending, missing scores last
    pub ranking: Vec<ProteinResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRunEntry {
    pub run_id: Uuid,
    pub ligand_id: Uuid,
    pub ligand_name: Option<String>,
    pub best_score: Option<f64>,
    pub best_protein: Option<String>,
    pub status: RunStatus,
    pub total_tasks: u32,
    pub done_tasks: u32,
    pub failed_tasks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    pub batch_id: Uuid,
    pub name: Option<String>,
    pub preset: String,
    pub progress: BatchProgress,
    /// Runs by best score ascending, missing scores last
    pub runs: Vec<BatchRunEntry>,
}

/// One entry of the batch listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: Option<String>,
    pub preset: String,
    pub progress: BatchProgress,
}

/// Lower scores first; `None` after every real score
pub fn compare_scores(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn protein_status(statuses: &[TaskState]) -> TaskState {
    if statuses.contains(&TaskState::Running) {
        TaskState::Running
    } else if statuses.contains(&TaskState::Pending) {
        TaskState::Pending
    } else if statuses.contains(&TaskState::Succeeded) {
        TaskState::Succeeded
    } else if statuses.contains(&TaskState::Failed) || statuses.is_empty() {
        TaskState::Failed
    } else {
        TaskState::Cancelled
    }
}

/// Group a run's tasks by protein and keep the minimum score per protein
pub fn rank_run(
    run_id: Uuid,
    tasks: &[Task],
    results: &[DockingResult],
    proteins: &HashMap<String, Protein>,
) -> RunResults {
    let result_by_task: HashMap<Uuid, &DockingResult> =
        results.iter().map(|r| (r.task_id, r)).collect();

    let mut order: Vec<String> = Vec::new();
    let mut entries: HashMap<String, (ProteinResult, Vec<TaskState>)> = HashMap::new();

    for task in tasks {
        let (entry, statuses) = entries.entry(task.protein_id.clone()).or_insert_with(|| {
            order.push(task.protein_id.clone());
            let protein = proteins.get(&task.protein_id);
            (
                ProteinResult {
                    protein_id: task.protein_id.clone(),
                    protein_name: protein
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| task.protein_id.clone()),
                    receptor_path: protein.map(|p| p.receptor_path.clone()),
                    best_score: None,
                    pose_paths: Vec::new(),
                    metrics: None,
                    status: TaskState::Pending,
                    error: None,
                },
                Vec::new(),
            )
        });

        statuses.push(task.status);
        if entry.error.is_none() {
            entry.error = task.error.clone();
        }

        let Some(result) = result_by_task.get(&task.task_id) else {
            continue;
        };
        if let Some(score) = result.best_score {
            if entry.best_score.map_or(true, |best| score < best) {
                entry.best_score = Some(score);
                entry.pose_paths = result.pose_paths.clone();
                entry.metrics = Some(result.metrics.clone());
            }
        }
    }

    let per_protein: Vec<ProteinResult> = order
        .iter()
        .filter_map(|id| entries.remove(id))
        .map(|(mut entry, statuses)| {
            entry.status = protein_status(&statuses);
            entry
        })
        .collect();

    let mut ranking = per_protein.clone();
    ranking.sort_by(|a, b| compare_scores(a.best_score, b.best_score));

    RunResults {
        run_id,
        per_protein,
        ranking,
    }
}

/// Best score and best protein of one run within a batch
pub fn summarize_batch_run(
    run: &Run,
    ligand: Option<&Ligand>,
    tasks: &[Task],
    results: &[DockingResult],
    proteins: &HashMap<String, Protein>,
) -> BatchRunEntry {
    let protein_by_task: HashMap<Uuid, &str> = tasks
        .iter()
        .map(|t| (t.task_id, t.protein_id.as_str()))
        .collect();

    let mut best_score: Option<f64> = None;
    let mut best_protein: Option<String> = None;
    for result in results {
        let Some(score) = result.best_score else {
            continue;
        };
        let Some(protein_id) = protein_by_task.get(&result.task_id) else {
            continue;
        };
        if best_score.map_or(true, |best| score < best) {
            best_score = Some(score);
            best_protein = Some(
                proteins
                    .get(*protein_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| protein_id.to_string()),
            );
        }
    }

    BatchRunEntry {
        run_id: run.run_id,
        ligand_id: run.ligand_id,
        ligand_name: ligand.and_then(|l| l.name.clone()),
        best_score,
        best_protein,
        status: run.status,
        total_tasks: run.total_tasks,
        done_tasks: run.done_tasks,
        failed_tasks: run.failed_tasks,
    }
}
