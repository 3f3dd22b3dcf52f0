//! # Task Executor
//!
//! Executes one delivery of one docking task:
//!
//! 1. Load the task; terminal tasks are acknowledged and skipped.
//! 2. `PENDING|RUNNING -> RUNNING` through the state machine, written with a
//!    guarded save so a cancellation that landed first wins.
//! 3. Run the steps under the soft time limit: load records, prepare the
//!    conformer (reusing existing files), check the receptor, resolve the
//!    box, invoke the engine, assemble the result.
//! 4. Fold the outcome into the task: SUCCEEDED with its result (one guarded
//!    write), RUNNING with the error recorded when the delivery will be
//!    retried, FAILED otherwise.
//! 5. Recompute the owning run.
//!
//! Every step error is an [`ExecutionError`]; none of them escapes a worker.
//! Only store failures around the state writes surface as [`DockingError`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error_classifier::{Disposition, RetryPolicy};
use super::errors::{ErrorKind, ExecutionError, StepResult};
use super::pocket::BoxResolver;
use super::status_aggregator::StatusAggregator;
use crate::config::{DockingConfig, ExecutionConfig};
use crate::constants::{artifacts, operations};
use crate::engine::{DockingEngine, EngineRequest, StructurePreparer};
use crate::error::{DockingError, Result};
use crate::logging::log_task_operation;
use crate::models::{DockingResult, Ligand, Task};
use crate::state_machine::{LigandStatus, TaskEvent, TaskState, TaskStateMachine, CANCELLED_BY_USER};
use crate::storage::{ArtifactStore, Store};

/// Per-delivery context handed over by the dispatch layer
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    /// 1-based dispatch attempt
    pub attempt: u32,
    /// Fired when the delivery is revoked
    pub cancel: CancellationToken,
}

impl DeliveryContext {
    pub fn new(attempt: u32, cancel: CancellationToken) -> Self {
        Self { attempt, cancel }
    }

    pub fn first() -> Self {
        Self::new(1, CancellationToken::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Succeeded {
        best_score: Option<f64>,
    },
    /// Task left RUNNING; the dispatcher should redeliver after `delay`
    Retrying {
        next_attempt: u32,
        delay: Duration,
        error: String,
    },
    Failed {
        error: String,
    },
    /// Task was already terminal when the delivery arrived
    Skipped {
        status: TaskState,
    },
    /// Task changed underneath the delivery (cancelled); nothing was written
    Superseded,
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Retrying { .. } => "retrying",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
            Self::Superseded => "superseded",
        }
    }

    /// Whether the task will not be delivered again after this outcome
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retrying { .. })
    }
}

/// Prepared ligand files for one task, as absolute paths
struct PreparedLigand {
    idx: u32,
    pdbqt: std::path::PathBuf,
}

#[derive(Clone)]
pub struct TaskExecutor {
    store: Arc<dyn Store>,
    objects: ArtifactStore,
    library: ArtifactStore,
    resolver: BoxResolver,
    engine: Arc<dyn DockingEngine>,
    preparer: Arc<dyn StructurePreparer>,
    aggregator: StatusAggregator,
    retry_policy: RetryPolicy,
    execution: ExecutionConfig,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        config: &DockingConfig,
        engine: Arc<dyn DockingEngine>,
        preparer: Arc<dyn StructurePreparer>,
    ) -> Self {
        let library = ArtifactStore::new(&config.storage.protein_library_root);
        Self {
            objects: ArtifactStore::new(&config.storage.object_store_root),
            resolver: BoxResolver::new(config.pocket.clone(), library.clone()),
            library,
            aggregator: StatusAggregator::new(store.clone()),
            retry_policy: RetryPolicy::new(config.execution.max_retries, config.backoff.clone()),
            execution: config.execution.clone(),
            store,
            engine,
            preparer,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn objects(&self) -> &ArtifactStore {
        &self.objects
    }

    /// Execute one delivery of `task_id`
    pub async fn execute(&self, task_id: Uuid, ctx: DeliveryContext) -> Result<ExecutionOutcome> {
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| DockingError::not_found("task", task_id))?;

        if task.status.is_terminal() {
            debug!(task_id = %task_id, status = %task.status, "Delivery for terminal task skipped");
            return Ok(ExecutionOutcome::Skipped {
                status: task.status,
            });
        }

        let previous = task.status;
        TaskStateMachine::apply(&mut task, TaskEvent::Start)?;
        if !self.store.save_task_guarded(&task, previous).await? {
            debug!(task_id = %task_id, "Task changed before start; delivery dropped");
            return Ok(ExecutionOutcome::Superseded);
        }
        self.refresh_run(task.run_id).await;

        log_task_operation(
            operations::EXECUTE_TASK,
            task.task_id,
            Some(task.run_id),
            Some(&task.protein_id),
            TaskState::Running.as_str(),
            Some(&format!("attempt {}", ctx.attempt)),
        );

        let mut trace = vec![format!(
            "Task {} attempt {} on protein {}",
            task.task_id, ctx.attempt, task.protein_id
        )];
        let soft_limit = self.execution.soft_timeout();
        let step_result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                Err(ExecutionError::new(ErrorKind::Cancelled, CANCELLED_BY_USER))
            }
            outcome = tokio::time::timeout(soft_limit, self.run_steps(&task, &ctx, &mut trace)) => {
                outcome.unwrap_or_else(|_| {
                    Err(ExecutionError::new(
                        ErrorKind::Timeout,
                        format!("Soft time limit of {}s exceeded", soft_limit.as_secs()),
                    ))
                })
            }
        };

        let outcome = match step_result {
            Ok(result) => {
                if let Some(score) = result.best_score {
                    trace.push(format!("Score: {score}"));
                }
                self.write_log(&mut task, &trace).await;
                self.settle_success(task, result).await?
            }
            Err(error) => {
                trace.push(format!("Error ({}): {}", error.kind, error.message));
                self.write_log(&mut task, &trace).await;
                self.settle_failure(task, error, ctx.attempt).await?
            }
        };

        log_task_operation(
            operations::EXECUTE_TASK,
            task_id,
            None,
            None,
            outcome.as_str(),
            None,
        );
        Ok(outcome)
    }

    /// Fold a failure the delivery itself could not report (hard time limit,
    /// worker panic, store failure) into the task. A task that never got
    /// past PENDING is started first so the attempt is counted.
    pub async fn abandon(
        &self,
        task_id: Uuid,
        error: ExecutionError,
        attempt: u32,
    ) -> Result<ExecutionOutcome> {
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| DockingError::not_found("task", task_id))?;

        match task.status {
            TaskState::Running => {}
            TaskState::Pending => {
                TaskStateMachine::apply(&mut task, TaskEvent::Start)?;
                if !self.store.save_task_guarded(&task, TaskState::Pending).await? {
                    return Ok(ExecutionOutcome::Superseded);
                }
            }
            status => return Ok(ExecutionOutcome::Skipped { status }),
        }
        warn!(task_id = %task_id, kind = %error.kind, "Delivery abandoned");
        self.settle_failure(task, error, attempt).await
    }

    async fn settle_success(&self, mut task: Task, result: DockingResult) -> Result<ExecutionOutcome> {
        TaskStateMachine::apply(&mut task, TaskEvent::Succeed)?;
        let written = self
            .store
            .complete_task(&task, Some(&result), TaskState::Running)
            .await?;
        self.refresh_run(task.run_id).await;

        if !written {
            info!(task_id = %task.task_id, "Task cancelled during execution; result discarded");
            return Ok(ExecutionOutcome::Superseded);
        }
        Ok(ExecutionOutcome::Succeeded {
            best_score: result.best_score,
        })
    }

    async fn settle_failure(
        &self,
        mut task: Task,
        error: ExecutionError,
        attempt: u32,
    ) -> Result<ExecutionOutcome> {
        let message = error.truncated(self.execution.max_error_chars);

        let (event, outcome) = if error.kind == ErrorKind::Cancelled {
            (TaskEvent::Cancel, ExecutionOutcome::Superseded)
        } else {
            match self.retry_policy.classify(&error, attempt) {
                Disposition::Retry {
                    next_attempt,
                    delay,
                } => (
                    TaskEvent::Retry(message.clone()),
                    ExecutionOutcome::Retrying {
                        next_attempt,
                        delay,
                        error: message.clone(),
                    },
                ),
                Disposition::Fail => (
                    TaskEvent::Fail(message.clone()),
                    ExecutionOutcome::Failed {
                        error: message.clone(),
                    },
                ),
            }
        };

        TaskStateMachine::apply(&mut task, event)?;
        let written = self
            .store
            .complete_task(&task, None, TaskState::Running)
            .await?;
        self.refresh_run(task.run_id).await;

        if !written {
            return Ok(ExecutionOutcome::Superseded);
        }
        if let ExecutionOutcome::Failed { .. } = outcome {
            warn!(
                task_id = %task.task_id,
                kind = %error.kind,
                attempts = task.attempts,
                error = %message,
                "Task failed"
            );
        }
        Ok(outcome)
    }

    async fn run_steps(
        &self,
        task: &Task,
        ctx: &DeliveryContext,
        trace: &mut Vec<String>,
    ) -> StepResult<DockingResult> {
        let run = self
            .store
            .get_run(task.run_id)
            .await?
            .ok_or_else(|| ExecutionError::input(format!("Run not found: {}", task.run_id)))?;
        let ligand = self.store.get_ligand(run.ligand_id).await?;
        let protein = self.store.get_protein(&task.protein_id).await?;
        let (ligand, protein) = match (ligand, protein) {
            (Some(ligand), Some(protein)) => (ligand, protein),
            _ => return Err(ExecutionError::input("Missing ligand or protein")),
        };

        if !ligand.has_representation() {
            self.fail_ligand(&ligand, "Missing ligand input").await;
            return Err(ExecutionError::input("Missing ligand input"));
        }

        let prepared = match task.conformer_id {
            Some(conformer_id) => Some(self.prepare_conformer(&ligand, conformer_id, ctx, trace).await?),
            None => None,
        };

        if !self.library.exists(&protein.receptor_path).await? {
            return Err(ExecutionError::resource("Receptor file not found"));
        }
        let receptor = self.library.resolve(&protein.receptor_path).await?;

        let resolution = self.resolver.resolve_box(&protein).await;
        trace.extend(resolution.trace.iter().cloned());

        let output_dir = self
            .objects
            .ensure_dir(&artifacts::pose_dir(task.task_id))
            .await?;
        let request = EngineRequest {
            task_id: task.task_id,
            ligand_id: ligand.ligand_id,
            protein_id: protein.protein_id.clone(),
            ligand_name: ligand.display_name(),
            receptor,
            ligand: prepared.as_ref().map(|p| p.pdbqt.clone()),
            docking_box: resolution.docking_box,
            exhaustiveness: run.options.exhaustiveness,
            num_poses: run.options.num_poses,
            output_dir,
        };

        trace.push(format!(
            "Docking {} against {} with {}{}",
            request.ligand_name,
            protein.protein_id,
            self.engine.name(),
            prepared
                .as_ref()
                .map(|p| format!(" (conformer {})", p.idx))
                .unwrap_or_default()
        ));
        let output = self.engine.dock(&request, ctx.cancel.clone()).await?;

        let pose_paths = output
            .pose_files
            .iter()
            .filter_map(|path| self.objects.relativize(path))
            .collect();

        let mut metrics = match output.metrics {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("engine_metrics".to_string(), other);
                map
            }
        };
        metrics.insert("engine".to_string(), Value::from(self.engine.name()));
        metrics.insert("box".to_string(), resolution.metadata());

        Ok(DockingResult::new(
            task.task_id,
            output.best_score,
            pose_paths,
            Value::Object(metrics),
        ))
    }

    /// Make the conformer's structure files exist, generating them at most once
    async fn prepare_conformer(
        &self,
        ligand: &Ligand,
        conformer_id: Uuid,
        ctx: &DeliveryContext,
        trace: &mut Vec<String>,
    ) -> StepResult<PreparedLigand> {
        let mut conformer = self
            .store
            .get_conformer(conformer_id)
            .await?
            .ok_or_else(|| ExecutionError::input(format!("Conformer not found: {conformer_id}")))?;

        let pdb_rel = artifacts::conformer_pdb(ligand.ligand_id, conformer.idx);
        let pdbqt_rel = artifacts::conformer_pdbqt(ligand.ligand_id, conformer.idx);

        if conformer.is_ready() && self.objects.exists(&pdbqt_rel).await? {
            trace.push(format!("Reusing conformer {}", conformer.idx));
        } else {
            let pdb = self.objects.resolve(&pdb_rel).await?;
            let pdbqt = self.objects.resolve(&pdbqt_rel).await?;
            if let Err(error) = self
                .preparer
                .prepare(ligand, conformer.idx, &pdb, &pdbqt, ctx.cancel.clone())
                .await
            {
                let error = ExecutionError::from(error);
                if error.kind == ErrorKind::Preparation {
                    self.fail_ligand(ligand, &error.message).await;
                }
                return Err(error);
            }

            conformer.mark_ready(pdb_rel, pdbqt_rel.clone());
            self.store.update_conformer(&conformer).await?;
            trace.push(format!("Generated conformer {}", conformer.idx));
        }

        Ok(PreparedLigand {
            idx: conformer.idx,
            pdbqt: self.objects.resolve(&pdbqt_rel).await?,
        })
    }

    async fn fail_ligand(&self, ligand: &Ligand, message: &str) {
        let message = super::errors::truncate_chars(message, self.execution.max_error_chars);
        if let Err(e) = self
            .store
            .set_ligand_status(ligand.ligand_id, LigandStatus::Failed, Some(message))
            .await
        {
            warn!(ligand_id = %ligand.ligand_id, error = %e, "Failed to mark ligand FAILED");
        }
    }

    async fn write_log(&self, task: &mut Task, trace: &[String]) {
        let relative = artifacts::task_log(task.task_id);
        match self.objects.write_text(&relative, &trace.join("\n")).await {
            Ok(_) => task.log_path = Some(relative),
            Err(e) => warn!(task_id = %task.task_id, error = %e, "Failed to write task log"),
        }
    }

    async fn refresh_run(&self, run_id: Uuid) {
        if let Err(e) = self.aggregator.recompute_run(run_id).await {
            warn!(run_id = %run_id, error = %e, "Run recomputation failed");
        }
    }
}
