//! # Ligand Model
//!
//! A submitted small molecule. Carries one or both raw representations: a
//! line-notation string (`smiles`) or a structure block (`molfile`).
//! Immutable after creation apart from `status`/`error`, which the executor
//! sets when preparation fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::LigandStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ligand {
    pub ligand_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: Option<String>,
    pub smiles: Option<String>,
    pub molfile: Option<String>,
    pub status: LigandStatus,
    pub error: Option<String>,
}

/// Ligand submission before it is validated and assigned an id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewLigand {
    pub name: Option<String>,
    pub smiles: Option<String>,
    pub molfile: Option<String>,
}

impl NewLigand {
    pub fn from_smiles(name: impl Into<String>, smiles: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            smiles: Some(smiles.into()),
            molfile: None,
        }
    }
}

impl Ligand {
    pub fn from_new(new_ligand: NewLigand) -> Self {
        Self {
            ligand_id: Uuid::new_v4(),
            created_at: Utc::now(),
            name: new_ligand.name,
            smiles: new_ligand.smiles,
            molfile: new_ligand.molfile,
            status: LigandStatus::Ready,
            error: None,
        }
    }

    /// True when at least one non-blank raw representation is present
    pub fn has_representation(&self) -> bool {
        let present = |value: &Option<String>| {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        };
        present(&self.smiles) || present(&self.molfile)
    }

    /// Name used in logs and placeholder structures
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.ligand_id.to_string())
    }
}
