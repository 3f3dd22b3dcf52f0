mod common;

use std::time::Duration;

use common::TestHarness;
use docking_core::engine::MockEngine;
use docking_core::models::RunOptionOverrides;
use docking_core::state_machine::{RunStatus, TaskState};
use docking_core::storage::Store;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_fast_run_against_two_proteins_succeeds() {
    let harness = TestHarness::new();
    let proteins = harness.add_proteins(2).await;
    let ligand = harness.add_ligand("caffeine", "CN1C=NC2=C1C(=O)N(C(=O)N2C)C").await;

    let graph = harness
        .service
        .submit_run(ligand.ligand_id, &proteins, "fast", &RunOptionOverrides::default())
        .await
        .unwrap();
    assert_eq!(graph.tasks.len(), 10);
    assert_eq!(harness.drain().await, 10);

    let progress = harness.service.run_status(graph.run.run_id).await.unwrap();
    assert_eq!(progress.status, RunStatus::Succeeded);
    assert_eq!(progress.done_tasks, 10);
    assert_eq!(progress.failed_tasks, 0);
    assert!(progress.running_task_ids.is_empty());

    for task in harness.store.list_tasks(graph.run.run_id).await.unwrap() {
        assert_eq!(task.status, TaskState::Succeeded);
        assert_eq!(task.attempts, 1);
        assert!(task.error.is_none());
        assert!(task.log_path.is_some());
    }

    // Ranking: best score per protein is the minimum over its conformer tasks
    let results = harness.service.run_results(graph.run.run_id).await.unwrap();
    assert_eq!(results.per_protein.len(), 2);
    for entry in &results.per_protein {
        let expected = graph
            .tasks
            .iter()
            .filter(|t| t.protein_id == entry.protein_id)
            .map(|t| MockEngine::score_for(t.task_id, ligand.ligand_id, &t.protein_id))
            .fold(f64::INFINITY, f64::min);
        assert_eq!(entry.best_score, Some(expected));
        assert_eq!(entry.status, TaskState::Succeeded);
        assert_eq!(entry.pose_paths.len(), 1);
    }
    let ranked: Vec<f64> = results.ranking.iter().filter_map(|r| r.best_score).collect();
    assert!(ranked.windows(2).all(|w| w[0] <= w[1]));

    // Cached counters on the run row agree with the recomputation
    let run = harness.store.get_run(graph.run.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.done_tasks, 10);
}

#[tokio::test]
async fn test_missing_receptor_fails_after_retries_without_touching_siblings() {
    let harness = TestHarness::with_config(|config| config.execution.max_retries = 2);
    let proteins = harness.add_proteins(2).await;
    std::fs::remove_file(harness.protein_dir("P2").join("receptor.pdbqt")).unwrap();
    let ligand = harness.add_ligand("ethanol", "CCO").await;

    let overrides = RunOptionOverrides {
        num_conformers: Some(2),
        ..Default::default()
    };
    let graph = harness
        .service
        .submit_run(ligand.ligand_id, &proteins, "fast", &overrides)
        .await
        .unwrap();

    // 2 healthy deliveries + 2 broken tasks × (1 + 2 retries)
    assert_eq!(harness.drain().await, 2 + 2 * 3);

    for task in harness.store.list_tasks(graph.run.run_id).await.unwrap() {
        if task.protein_id == "P2" {
            assert_eq!(task.status, TaskState::Failed);
            assert_eq!(task.attempts, 3);
            assert_eq!(task.error.as_deref(), Some("Receptor file not found"));
        } else {
            assert_eq!(task.status, TaskState::Succeeded);
        }
    }

    let progress = harness.service.run_status(graph.run.run_id).await.unwrap();
    assert_eq!(progress.status, RunStatus::Failed);
    assert_eq!(progress.done_tasks, 2);
    assert_eq!(progress.failed_tasks, 2);

    let results = harness.service.run_results(graph.run.run_id).await.unwrap();
    let failed = results
        .ranking
        .last()
        .expect("failed protein is ranked last");
    assert_eq!(failed.protein_id, "P2");
    assert_eq!(failed.best_score, None);
    assert_eq!(failed.status, TaskState::Failed);
}

#[tokio::test]
async fn test_batch_results_rank_runs_by_best_score() {
    let harness = TestHarness::new();
    let proteins = harness.add_proteins(2).await;
    let ethanol = harness.add_ligand("ethanol", "CCO").await;
    let methanol = harness.add_ligand("methanol", "CO").await;

    let overrides = RunOptionOverrides {
        num_conformers: Some(2),
        ..Default::default()
    };
    let graph = harness
        .service
        .submit_batch(
            Some("alcohols".to_string()),
            &[ethanol.ligand_id, methanol.ligand_id],
            &proteins,
            "fast",
            &overrides,
        )
        .await
        .unwrap();
    assert_eq!(harness.drain().await, 8);

    let results = harness.service.batch_results(graph.batch.batch_id).await.unwrap();
    assert_eq!(results.name.as_deref(), Some("alcohols"));
    assert_eq!(results.preset, "fast");
    assert_eq!(results.progress.status, RunStatus::Succeeded);
    assert_eq!(results.progress.done_runs, 2);
    assert_eq!(results.progress.done_tasks, 8);
    assert_eq!(results.runs.len(), 2);
    assert!(results.runs[0].best_score <= results.runs[1].best_score);
    for entry in &results.runs {
        assert_eq!(entry.status, RunStatus::Succeeded);
        assert_eq!(entry.done_tasks, 4);
        assert!(entry.best_protein.as_deref().is_some_and(|p| p.starts_with("Protein P")));
    }
}

#[tokio::test]
async fn test_worker_pool_drives_run_to_completion() {
    let harness = TestHarness::new();
    let proteins = harness.add_proteins(3).await;
    let ligand = harness.add_ligand("ethanol", "CCO").await;
    let graph = harness
        .service
        .submit_run(ligand.ligand_id, &proteins, "fast", &RunOptionOverrides::default())
        .await
        .unwrap();

    let pool = harness.pool();
    let stats = pool.stats();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(pool.run(shutdown.clone()));

    let finished = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let progress = harness.service.run_status(graph.run.run_id).await.unwrap();
            if progress.status.is_terminal() {
                return progress;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("run finished in time");

    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(finished.status, RunStatus::Succeeded);
    assert_eq!(finished.done_tasks, 15);
    assert_eq!(stats.processed(), 15);
}
