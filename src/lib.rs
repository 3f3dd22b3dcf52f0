#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Docking Core Rust
//!
//! Job orchestration core for fan-out molecular docking.
//!
//! ## Overview
//!
//! A submission of one ligand (a *run*) or many ligands (a *batch*) against a
//! set of proteins is expanded into independent tasks, one per
//! (protein, conformer) pair. Tasks are dispatched through an at-least-once
//! job queue to a bounded worker pool, executed against an external docking
//! engine with retries, time limits and cancellation, and their outcomes roll
//! up continuously into run and batch status.
//!
//! ## Module Organization
//!
//! - [`models`] - Ligands, conformers, proteins, batches, runs, tasks, results
//! - [`state_machine`] - Task life cycle and derived status types
//! - [`orchestration`] - Conformer cache, task graph, box resolution, executor, aggregation
//! - [`messaging`] - Job queue and worker pool
//! - [`engine`] - Docking engine and structure preparation adapters
//! - [`storage`] - Record store trait, in-memory and PostgreSQL stores, artifact store
//! - [`service`] - Submission, query and cancellation surface
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docking_core::config::DockingConfig;
//! use docking_core::messaging::InMemoryJobQueue;
//! use docking_core::models::{NewLigand, RunOptionOverrides};
//! use docking_core::service::DockingService;
//! use docking_core::storage::MemoryStore;
//!
//! # async fn example() -> docking_core::Result<()> {
//! let config = DockingConfig::default();
//! let service = DockingService::from_config(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(InMemoryJobQueue::new()),
//!     &config,
//! );
//!
//! let ligand = service
//!     .create_ligand(NewLigand::from_smiles("caffeine", "CN1C=NC2=C1C(=O)N(C(=O)N2C)C"))
//!     .await?;
//! let graph = service
//!     .submit_run(ligand.ligand_id, &["1ABC".to_string()], "fast", &RunOptionOverrides::default())
//!     .await?;
//! println!("run {} has {} tasks", graph.run.run_id, graph.tasks.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod seed;
pub mod service;
pub mod state_machine;
pub mod storage;
pub mod validation;

pub use config::{ConfigManager, ConfigurationError, DockingConfig};
pub use error::{DockingError, Result};
pub use messaging::{InMemoryJobQueue, JobQueue, WorkerPool};
pub use models::{
    Batch, BindingBox, Conformer, DockingResult, Ligand, NewLigand, PocketMethod, Protein, Run,
    RunOptionOverrides, RunOptions, Task,
};
pub use orchestration::{
    BatchProgress, BoxResolution, BoxResolver, RunProgress, RunResults, TaskExecutor,
    TaskGraphBuilder,
};
pub use service::DockingService;
pub use state_machine::{RunStatus, TaskEvent, TaskState, TaskStateMachine};
pub use storage::{ArtifactStore, MemoryStore, Store};
