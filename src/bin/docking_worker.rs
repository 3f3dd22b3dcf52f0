//! Docking Worker Binary
//!
//! Loads configuration, opens the record store, seeds the protein library
//! and runs the worker pool until ctrl-c.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use docking_core::config::{ConfigManager, StorageBackend};
use docking_core::engine::{engine_from_config, preparer_from_config};
use docking_core::logging::init_structured_logging;
use docking_core::messaging::{InMemoryJobQueue, JobQueue, WorkerPool};
use docking_core::orchestration::TaskExecutor;
use docking_core::seed::seed_proteins;
use docking_core::storage::{MemoryStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("loading configuration")?;
    let config = manager.config();
    info!(
        environment = manager.environment(),
        source = ?manager.source_file(),
        "Starting docking worker"
    );

    let store = open_store(config).await?;
    let seeded = seed_proteins(
        store.as_ref(),
        &config.seed,
        &config.storage.protein_library_root,
    )
    .await
    .context("seeding protein library")?;
    info!(seeded, "Protein library ready");

    let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
    let executor = TaskExecutor::new(
        store.clone(),
        config,
        engine_from_config(&config.engine),
        preparer_from_config(&config.engine),
    );
    let pool = WorkerPool::new(queue, executor, &config.execution);

    let shutdown = CancellationToken::new();
    let pool_handle = tokio::spawn(pool.run(shutdown.clone()));

    signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutdown signal received; draining in-flight deliveries");
    shutdown.cancel();
    pool_handle.await.context("worker pool task")?;

    info!("Docking worker stopped");
    Ok(())
}

async fn open_store(config: &docking_core::DockingConfig) -> Result<Arc<dyn Store>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres => {
            let url = config
                .storage
                .database_url
                .as_deref()
                .context("storage.database_url is required for the postgres backend")?;
            let store = docking_core::storage::PgStore::connect(url, config.storage.max_connections)
                .await
                .context("connecting to PostgreSQL")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres => {
            anyhow::bail!("built without the postgres feature")
        }
    }
}
