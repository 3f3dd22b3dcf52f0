mod common;

use common::{PdbBuilder, TestHarness};
use docking_core::models::{BindingBox, PocketMethod, ReceptorMeta};
use docking_core::orchestration::{BoxMethod, BoxResolver};
use docking_core::storage::ArtifactStore;

fn resolver(harness: &TestHarness) -> BoxResolver {
    BoxResolver::new(
        harness.config.pocket.clone(),
        ArtifactStore::new(&harness.config.storage.protein_library_root),
    )
}

#[tokio::test]
async fn test_explicit_box_wins() {
    let harness = TestHarness::new();
    let explicit = BindingBox {
        center: [1.0, 2.0, 3.0],
        size: [22.0, 22.0, 22.0],
    };
    let holo = PdbBuilder::new().ligand_atom([10.0, 10.0, 10.0]).build();
    let protein = harness
        .add_protein_with_files("P1", &[("holo.pdb", &holo)])
        .await
        .with_default_box(explicit);

    let resolution = resolver(&harness).resolve_box(&protein).await;
    assert_eq!(resolution.method, BoxMethod::Default);
    assert_eq!(resolution.docking_box, explicit);
    assert_eq!(resolution.source.as_deref(), Some("manifest"));
}

#[tokio::test]
async fn test_ligand_heteroatoms_define_pocket() {
    let harness = TestHarness::new();
    let holo = PdbBuilder::new()
        .atom([50.0, 50.0, 50.0])
        .ligand_atom([0.0, 0.0, 0.0])
        .ligand_atom([20.0, 4.0, 2.0])
        .water([-40.0, -40.0, -40.0])
        .build();
    let protein = harness
        .add_protein_with_files("P1", &[("holo.pdb", &holo)])
        .await;

    let resolution = resolver(&harness).resolve_box(&protein).await;
    assert_eq!(resolution.method, BoxMethod::Ligand);
    assert_eq!(resolution.docking_box.center, [10.0, 2.0, 1.0]);
    // padding 6 on each side, floored at 18
    assert_eq!(resolution.docking_box.size, [32.0, 18.0, 18.0]);
    assert_eq!(resolution.source.as_deref(), Some("P1/holo.pdb"));
}

#[tokio::test]
async fn test_backbone_only_structure_falls_back_to_protein_box() {
    let harness = TestHarness::new();
    let apo = PdbBuilder::new()
        .atom([0.0, 0.0, 0.0])
        .atom([30.0, 30.0, 30.0])
        .water([5.0, 5.0, 5.0])
        .build();
    let protein = harness.add_protein_with_files("P1", &[("apo.pdb", &apo)]).await;
    assert_eq!(protein.pocket_method, None, "auto comes from configuration");

    let resolution = resolver(&harness).resolve_box(&protein).await;
    assert_eq!(resolution.method, BoxMethod::Protein);
    assert_eq!(resolution.docking_box.center, [15.0, 15.0, 15.0]);
    assert_eq!(resolution.docking_box.size, [42.0, 42.0, 42.0]);
    assert!(resolution
        .trace
        .iter()
        .any(|line| line.starts_with("No ligand HETATM found")));
}

#[tokio::test]
async fn test_ligand_method_never_uses_protein_atoms() {
    let harness = TestHarness::new();
    let apo = PdbBuilder::new().atom([0.0, 0.0, 0.0]).build();
    let protein = harness
        .add_protein_with_files("P1", &[("apo.pdb", &apo)])
        .await
        .with_pocket_method(PocketMethod::Ligand);

    let resolution = resolver(&harness).resolve_box(&protein).await;
    assert_eq!(resolution.method, BoxMethod::Fallback);
    assert_eq!(resolution.docking_box, BindingBox::origin_cube(20.0));
}

#[tokio::test]
async fn test_empty_reference_gives_origin_cube() {
    let harness = TestHarness::new();
    let protein = harness
        .add_protein_with_files("P1", &[("empty.pdb", "")])
        .await;

    let resolution = resolver(&harness).resolve_box(&protein).await;
    assert_eq!(resolution.method, BoxMethod::Fallback);
    assert_eq!(resolution.docking_box.center, [0.0, 0.0, 0.0]);
    assert_eq!(resolution.docking_box.size, [20.0, 20.0, 20.0]);
}

#[tokio::test]
async fn test_no_reference_file_gives_origin_cube() {
    let harness = TestHarness::new();
    let protein = harness.add_protein("P1").await;

    let resolution = resolver(&harness).resolve_box(&protein).await;
    assert_eq!(resolution.method, BoxMethod::Fallback);
    assert_eq!(resolution.source, None);
}

#[tokio::test]
async fn test_pocket_file_is_preferred_over_directory_scan() {
    let harness = TestHarness::new();
    let pocket = PdbBuilder::new().ligand_atom([1.0, 1.0, 1.0]).build();
    let richer = PdbBuilder::new()
        .ligand_atom([40.0, 40.0, 40.0])
        .ligand_atom([41.0, 41.0, 41.0])
        .ligand_atom([42.0, 42.0, 42.0])
        .build();
    let protein = harness
        .add_protein_with_files("P1", &[("pocket.pdb", &pocket), ("richer.pdb", &richer)])
        .await
        .with_receptor_meta(ReceptorMeta {
            pocket_pdb: Some("P1/pocket.pdb".to_string()),
            receptor_pdb: None,
            notes: None,
        });

    let resolution = resolver(&harness).resolve_box(&protein).await;
    assert_eq!(resolution.method, BoxMethod::Ligand);
    assert_eq!(resolution.docking_box.center, [1.0, 1.0, 1.0]);
    assert_eq!(resolution.source.as_deref(), Some("P1/pocket.pdb"));
}

#[tokio::test]
async fn test_directory_scan_picks_file_with_most_ligand_atoms() {
    let harness = TestHarness::new();
    let sparse = PdbBuilder::new().ligand_atom([1.0, 1.0, 1.0]).build();
    let dense = PdbBuilder::new()
        .ligand_atom([40.0, 40.0, 40.0])
        .ligand_atom([42.0, 42.0, 42.0])
        .build();
    let protein = harness
        .add_protein_with_files("P1", &[("a_sparse.pdb", &sparse), ("b_dense.pdb", &dense)])
        .await;

    let resolution = resolver(&harness).resolve_box(&protein).await;
    assert_eq!(resolution.source.as_deref(), Some("P1/b_dense.pdb"));
    assert_eq!(resolution.docking_box.center, [41.0, 41.0, 41.0]);
}
