//! # Pocket / Box Resolver
//!
//! Derives the docking search box for a protein. Resolution order, first
//! success wins:
//!
//! 1. explicit box on the protein record (`default`)
//! 2. non-water `HETATM` bounding box of the reference structure (`ligand`)
//! 3. `ATOM` bounding box of the reference structure (`protein`)
//! 4. origin-centred cube (`fallback`)
//!
//! Steps 2 and 3 are gated by the protein's pocket method hint. Every attempt
//! appends a trace line, and the whole [`BoxResolution`] is persisted with the
//! task's result so docking parameters are reproducible.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::PocketConfig;
use crate::constants::WATER_RESIDUES;
use crate::models::{BindingBox, Protein};
use crate::storage::ArtifactStore;

/// Which resolution case produced the box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxMethod {
    Default,
    Ligand,
    Protein,
    Fallback,
}

impl BoxMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Ligand => "ligand",
            Self::Protein => "protein",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for BoxMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxResolution {
    #[serde(rename = "box")]
    pub docking_box: BindingBox,
    pub method: BoxMethod,
    /// Reference file relative to the protein library, or `manifest`
    pub source: Option<String>,
    pub padding: f64,
    pub min_size: f64,
    pub trace: Vec<String>,
}

impl BoxResolution {
    /// Metadata block embedded in the result's metrics
    pub fn metadata(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Which record types to collect coordinates from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomSelection {
    /// `HETATM` records, solvent excluded
    Heteroatoms,
    /// `ATOM` records
    Atoms,
}

/// Parse coordinates from fixed-column PDB text.
///
/// Lines shorter than 54 characters, other record types, solvent heteroatoms
/// and unparsable coordinates are skipped.
pub fn parse_coordinates(contents: &str, selection: AtomSelection) -> Vec<[f64; 3]> {
    let wanted = match selection {
        AtomSelection::Heteroatoms => "HETATM",
        AtomSelection::Atoms => "ATOM",
    };

    contents
        .lines()
        .filter(|line| line.len() >= 54)
        .filter_map(|line| {
            let record = line.get(0..6)?.trim();
            if record != wanted {
                return None;
            }
            if selection == AtomSelection::Heteroatoms {
                let resname = line.get(17..20)?.trim();
                if WATER_RESIDUES.contains(&resname) {
                    return None;
                }
            }
            let x = line.get(30..38)?.trim().parse::<f64>().ok()?;
            let y = line.get(38..46)?.trim().parse::<f64>().ok()?;
            let z = line.get(46..54)?.trim().parse::<f64>().ok()?;
            Some([x, y, z])
        })
        .collect()
}

/// Number of non-solvent `HETATM` records, used to rank candidate files
pub fn count_ligand_atoms(contents: &str) -> usize {
    contents
        .lines()
        .filter(|line| line.starts_with("HETATM"))
        .filter_map(|line| line.get(17..20))
        .filter(|resname| !WATER_RESIDUES.contains(&resname.trim()))
        .count()
}

/// Axis-aligned bounding box grown by `padding` on every side, each edge
/// floored at `min_size`. `None` for an empty coordinate set.
pub fn compute_box(coords: &[[f64; 3]], padding: f64, min_size: f64) -> Option<BindingBox> {
    let first = coords.first()?;
    let mut min = *first;
    let mut max = *first;
    for point in &coords[1..] {
        for axis in 0..3 {
            min[axis] = min[axis].min(point[axis]);
            max[axis] = max[axis].max(point[axis]);
        }
    }

    let mut center = [0.0; 3];
    let mut size = [0.0; 3];
    for axis in 0..3 {
        center[axis] = (min[axis] + max[axis]) / 2.0;
        size[axis] = (max[axis] - min[axis] + padding * 2.0).max(min_size);
    }
    Some(BindingBox { center, size })
}

#[derive(Debug, Clone)]
pub struct BoxResolver {
    config: PocketConfig,
    library: ArtifactStore,
}

impl BoxResolver {
    pub fn new(config: PocketConfig, library: ArtifactStore) -> Self {
        Self { config, library }
    }

    pub fn config(&self) -> &PocketConfig {
        &self.config
    }

    pub async fn resolve_box(&self, protein: &Protein) -> BoxResolution {
        let padding = self.config.padding;
        let min_size = self.config.min_size;
        let mut trace = Vec::new();

        if let Some(explicit) = protein.default_box {
            trace.push(format!("Using explicit box for protein {}", protein.protein_id));
            return BoxResolution {
                docking_box: explicit,
                method: BoxMethod::Default,
                source: Some("manifest".to_string()),
                padding,
                min_size,
                trace,
            };
        }

        let method = protein.pocket_method.unwrap_or(self.config.default_method);
        let reference = self.pick_reference(protein, &mut trace).await;
        let source = reference.as_ref().map(|(relative, _)| relative.clone());
        let label = source.clone().unwrap_or_else(|| "pdb".to_string());
        let contents = reference.map(|(_, contents)| contents);

        if let Some(contents) = contents.as_deref() {
            if method.tries_ligand() {
                let coords = parse_coordinates(contents, AtomSelection::Heteroatoms);
                if let Some(docking_box) = compute_box(&coords, padding, min_size) {
                    trace.push(format!("Pocket box from ligand (pdb={label})"));
                    return BoxResolution {
                        docking_box,
                        method: BoxMethod::Ligand,
                        source,
                        padding,
                        min_size,
                        trace,
                    };
                }
                trace.push(format!("No ligand HETATM found in {label}, falling back."));
            }

            if method.tries_protein() {
                let coords = parse_coordinates(contents, AtomSelection::Atoms);
                if let Some(docking_box) = compute_box(&coords, padding, min_size) {
                    trace.push(format!("Pocket box from protein bbox (pdb={label})"));
                    return BoxResolution {
                        docking_box,
                        method: BoxMethod::Protein,
                        source,
                        padding,
                        min_size,
                        trace,
                    };
                }
                trace.push(format!("No protein ATOM found in {label}, falling back."));
            }
        }

        trace.push("Using fallback docking box (center 0,0,0).".to_string());
        debug!(protein_id = %protein.protein_id, method = %method, "Box resolution fell back to origin cube");
        BoxResolution {
            docking_box: BindingBox::origin_cube(self.config.default_size),
            method: BoxMethod::Fallback,
            source,
            padding,
            min_size,
            trace,
        }
    }

    /// Reference structure, as (library-relative path, contents).
    ///
    /// Preference: existing `pocket_pdb`, then existing `receptor_pdb`, then
    /// the `*.pdb` file next to the receptor with the most non-water
    /// heteroatoms (ties go to the lexically first file).
    async fn pick_reference(
        &self,
        protein: &Protein,
        trace: &mut Vec<String>,
    ) -> Option<(String, String)> {
        let meta = &protein.receptor_meta;
        for relative in [&meta.pocket_pdb, &meta.receptor_pdb].into_iter().flatten() {
            if let Some(contents) = self.read_library_file(relative).await {
                return Some((relative.clone(), contents));
            }
            trace.push(format!("Reference file {relative} not found, skipping."));
        }

        let receptor = self.library.resolve(&protein.receptor_path).await.ok()?;
        let directory = receptor.parent()?.to_path_buf();
        let candidates = list_pdb_files(&directory).await;
        if candidates.is_empty() {
            trace.push(format!(
                "No reference structure found for protein {}",
                protein.protein_id
            ));
            return None;
        }

        let mut best: Option<(usize, String, String)> = None;
        for candidate in candidates {
            let Some(relative) = self.library.relativize(&candidate) else {
                continue;
            };
            let Some(contents) = self.read_library_file(&relative).await else {
                continue;
            };
            let count = count_ligand_atoms(&contents);
            if best.as_ref().map_or(true, |(top, _, _)| count > *top) {
                best = Some((count, relative, contents));
            }
        }

        let (_, relative, contents) = best?;
        Some((relative, contents))
    }

    async fn read_library_file(&self, relative: &str) -> Option<String> {
        let path = self.library.resolve(relative).await.ok()?;
        let bytes = tokio::fs::read(&path).await.ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

async fn list_pdb_files(directory: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(directory).await else {
        return files;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "pdb") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    files
}
