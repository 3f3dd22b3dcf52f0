//! # Messaging Module
//!
//! Task dispatch: the job queue that carries task ids to workers and the
//! worker pool that executes them with bounded concurrency.

pub mod errors;
pub mod message;
pub mod queue;
pub mod worker_pool;

pub use errors::{QueueError, QueueResult};
pub use message::Delivery;
pub use queue::{InMemoryJobQueue, JobQueue};
pub use worker_pool::{WorkerPool, WorkerPoolStats};
