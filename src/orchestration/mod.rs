//! # Orchestration
//!
//! Everything between a submission and a finished result:
//!
//! - [`conformer_cache`]: monotonic per-ligand conformer records
//! - [`presets`]: named option sets and override merging
//! - [`task_graph`]: run/batch fan-out into (protein, conformer) tasks
//! - [`pocket`]: docking box resolution with ordered fallbacks
//! - [`task_executor`]: one delivery of one task, through the state machine
//! - [`error_classifier`]: retry or fail after an execution error
//! - [`status_aggregator`]: task -> run -> batch status roll-up
//! - [`results`]: per-protein ranking and batch result assembly

pub mod conformer_cache;
pub mod error_classifier;
pub mod errors;
pub mod pocket;
pub mod presets;
pub mod results;
pub mod status_aggregator;
pub mod task_executor;
pub mod task_graph;

pub use conformer_cache::ConformerCache;
pub use error_classifier::{Disposition, RetryPolicy};
pub use errors::{ErrorKind, ExecutionError};
pub use pocket::{BoxMethod, BoxResolution, BoxResolver};
pub use presets::PresetRegistry;
pub use results::{BatchResults, BatchRunEntry, BatchSummary, ProteinResult, RunResults};
pub use status_aggregator::{BatchProgress, RunProgress, StatusAggregator, StatusCounts};
pub use task_executor::{DeliveryContext, ExecutionOutcome, TaskExecutor};
pub use task_graph::{BatchGraph, RunGraph, TaskGraphBuilder};
