//! Shared fixtures for integration tests: a temporary protein library and
//! object store, an in-memory store and queue, and the service and executor
//! wired the way the worker binary wires them.

#![allow(dead_code)]

pub mod builders;
pub mod flaky_store;
pub mod strategies;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use uuid::Uuid;

use docking_core::config::DockingConfig;
use docking_core::engine::{DockingEngine, MockEngine, PlaceholderPreparer};
use docking_core::messaging::{InMemoryJobQueue, JobQueue, WorkerPool};
use docking_core::models::{Ligand, NewLigand, Protein};
use docking_core::orchestration::TaskExecutor;
use docking_core::service::DockingService;
use docking_core::storage::Store;

pub use builders::*;
pub use flaky_store::FlakyStore;

pub struct TestHarness {
    pub dir: TempDir,
    pub config: DockingConfig,
    pub store: Arc<FlakyStore>,
    pub queue: Arc<InMemoryJobQueue>,
    pub service: DockingService,
    pub executor: TaskExecutor,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Harness with configuration tweaks applied on top of test defaults
    pub fn with_config(tweak: impl FnOnce(&mut DockingConfig)) -> Self {
        Self::with_engine(tweak, Arc::new(MockEngine::new()))
    }

    /// Harness whose executor docks with `engine`
    pub fn with_engine(
        tweak: impl FnOnce(&mut DockingConfig),
        engine: Arc<dyn DockingEngine>,
    ) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = DockingConfig::default();
        config.storage.object_store_root = dir.path().join("objects");
        config.storage.protein_library_root = dir.path().join("library");
        config.execution.worker_concurrency = 4;
        config.backoff.base_delay_ms = 1;
        config.backoff.max_delay_ms = 5;
        tweak(&mut config);
        std::fs::create_dir_all(&config.storage.protein_library_root).expect("library dir");

        let store = Arc::new(FlakyStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let service = DockingService::from_config(store.clone(), queue.clone(), &config);
        let executor = TaskExecutor::new(
            store.clone(),
            &config,
            engine,
            Arc::new(PlaceholderPreparer),
        );

        Self {
            dir,
            config,
            store,
            queue,
            service,
            executor,
        }
    }

    pub fn pool(&self) -> WorkerPool {
        WorkerPool::new(self.queue.clone(), self.executor.clone(), &self.config.execution)
    }

    /// Library directory of one protein
    pub fn protein_dir(&self, protein_id: &str) -> std::path::PathBuf {
        self.config.storage.protein_library_root.join(protein_id)
    }

    /// Register a protein whose receptor file exists in the library
    pub async fn add_protein(&self, protein_id: &str) -> Protein {
        self.add_protein_with_files(protein_id, &[]).await
    }

    /// Register a protein and write extra files (name, contents) next to its receptor
    pub async fn add_protein_with_files(&self, protein_id: &str, files: &[(&str, &str)]) -> Protein {
        let dir = self.protein_dir(protein_id);
        std::fs::create_dir_all(&dir).expect("protein dir");
        std::fs::write(dir.join("receptor.pdbqt"), "REMARK receptor\n").expect("receptor");
        for (name, contents) in files {
            std::fs::write(dir.join(name), contents).expect("protein file");
        }

        let protein = Protein::new(
            protein_id,
            format!("Protein {protein_id}"),
            format!("{protein_id}/receptor.pdbqt"),
        );
        self.store.upsert_protein(&protein).await.expect("upsert protein");
        protein
    }

    /// Register `count` proteins named P1..Pcount and return their ids
    pub async fn add_proteins(&self, count: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);
        for n in 1..=count {
            let id = format!("P{n}");
            self.add_protein(&id).await;
            ids.push(id);
        }
        ids
    }

    pub async fn add_ligand(&self, name: &str, smiles: &str) -> Ligand {
        self.service
            .create_ligand(NewLigand::from_smiles(name, smiles))
            .await
            .expect("create ligand")
    }

    /// Execute queued deliveries inline until the queue stays empty
    pub async fn drain(&self) -> usize {
        let pool = self.pool();
        let mut processed = 0;
        loop {
            match tokio::time::timeout(Duration::from_millis(250), self.queue.receive()).await {
                Ok(Ok(Some(delivery))) => {
                    pool.process(delivery).await;
                    processed += 1;
                }
                _ => return processed,
            }
        }
    }

    pub async fn task_ids(&self, run_id: Uuid) -> Vec<Uuid> {
        self.store
            .list_tasks(run_id)
            .await
            .expect("list tasks")
            .into_iter()
            .map(|t| t.task_id)
            .collect()
    }
}
