//! # Protein Library Seed
//!
//! Loads the protein manifest (`<library>/manifest.json` unless configured
//! otherwise) into the store on startup. Seeding only happens while the
//! protein table is empty, so restarts and concurrent workers are harmless.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SeedConfig;
use crate::constants::{operations, PROTEIN_MANIFEST_FILE};
use crate::models::{BindingBox, PocketMethod, Protein, ReceptorMeta};
use crate::storage::{Store, StoreError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One protein entry of the manifest
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub organism: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    pub receptor_pdbqt: String,
    #[serde(default)]
    pub receptor_pdb: Option<String>,
    #[serde(default)]
    pub pocket_pdb: Option<String>,
    #[serde(default)]
    pub default_box: Option<BindingBox>,
    #[serde(default)]
    pub pocket_method: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ManifestRecord {
    pub fn into_protein(self) -> Protein {
        let pocket_method = self.pocket_method.as_deref().and_then(|raw| {
            raw.parse::<PocketMethod>()
                .map_err(|e| warn!(protein_id = %self.id, error = %e, "Ignoring pocket method"))
                .ok()
        });

        Protein {
            protein_id: self.id,
            name: self.name,
            category: self.category,
            organism: self.organism,
            source_id: self.source_id,
            receptor_path: self.receptor_pdbqt,
            receptor_meta: ReceptorMeta {
                pocket_pdb: self.pocket_pdb,
                receptor_pdb: self.receptor_pdb,
                notes: self.notes,
            },
            default_box: self.default_box,
            pocket_method,
        }
    }
}

pub fn parse_manifest(path: &Path, contents: &str) -> Result<Vec<ManifestRecord>, SeedError> {
    serde_json::from_str(contents).map_err(|source| SeedError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn manifest_path(config: &SeedConfig, library_root: &Path) -> PathBuf {
    config
        .manifest_path
        .clone()
        .unwrap_or_else(|| library_root.join(PROTEIN_MANIFEST_FILE))
}

/// Seed proteins from the manifest when the store has none.
/// Returns the number of proteins inserted.
pub async fn seed_proteins(
    store: &dyn Store,
    config: &SeedConfig,
    library_root: &Path,
) -> Result<usize, SeedError> {
    if !config.enabled {
        return Ok(0);
    }

    let path = manifest_path(config, library_root);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        info!(operation = operations::SEED_PROTEINS, path = %path.display(), "No protein manifest; skipping seed");
        return Ok(0);
    }
    if store.count_proteins().await? > 0 {
        return Ok(0);
    }

    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| SeedError::Io {
            path: path.clone(),
            source,
        })?;
    let records = parse_manifest(&path, &contents)?;

    let count = records.len();
    for record in records {
        store.upsert_protein(&record.into_protein()).await?;
    }

    info!(
        operation = operations::SEED_PROTEINS,
        path = %path.display(),
        count,
        "Protein library seeded"
    );
    Ok(count)
}
