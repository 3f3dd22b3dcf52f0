//! # Protein Model
//!
//! Target structures. Read-only to the orchestration engine; loaded once
//! from the library manifest (see [`crate::seed`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned docking search box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BindingBox {
    pub center: [f64; 3],
    pub size: [f64; 3],
}

impl BindingBox {
    /// Cube of edge `edge` centred on the origin
    pub fn origin_cube(edge: f64) -> Self {
        Self {
            center: [0.0, 0.0, 0.0],
            size: [edge, edge, edge],
        }
    }
}

/// How the pocket resolver derives a box when no explicit one is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PocketMethod {
    /// Bounding box of co-crystallised (non-water) heteroatoms
    Ligand,
    /// Bounding box of the protein's own atoms
    Protein,
    /// Ligand first, protein second
    #[default]
    Auto,
    /// Alias of `Protein` kept for manifests that use it
    Bbox,
}

impl PocketMethod {
    pub fn tries_ligand(&self) -> bool {
        matches!(self, Self::Ligand | Self::Auto)
    }

    pub fn tries_protein(&self) -> bool {
        matches!(self, Self::Protein | Self::Auto | Self::Bbox)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ligand => "ligand",
            Self::Protein => "protein",
            Self::Auto => "auto",
            Self::Bbox => "bbox",
        }
    }
}

impl fmt::Display for PocketMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PocketMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ligand" => Ok(Self::Ligand),
            "protein" => Ok(Self::Protein),
            "auto" => Ok(Self::Auto),
            "bbox" => Ok(Self::Bbox),
            other => Err(format!("Invalid pocket method: {other}")),
        }
    }
}

/// Auxiliary structure files shipped with a receptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceptorMeta {
    /// Pocket-specific structure, relative to the protein library
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pocket_pdb: Option<String>,
    /// Full receptor structure in PDB form, relative to the protein library
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receptor_pdb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protein {
    pub protein_id: String,
    pub name: String,
    pub category: Option<String>,
    pub organism: Option<String>,
    pub source_id: Option<String>,
    /// Engine-ready receptor, relative to the protein library
    pub receptor_path: String,
    pub receptor_meta: ReceptorMeta,
    pub default_box: Option<BindingBox>,
    pub pocket_method: Option<PocketMethod>,
}

impl Protein {
    /// Minimal protein record; used by the seed loader and tests
    pub fn new(
        protein_id: impl Into<String>,
        name: impl Into<String>,
        receptor_path: impl Into<String>,
    ) -> Self {
        Self {
            protein_id: protein_id.into(),
            name: name.into(),
            category: None,
            organism: None,
            source_id: None,
            receptor_path: receptor_path.into(),
            receptor_meta: ReceptorMeta::default(),
            default_box: None,
            pocket_method: None,
        }
    }

    pub fn with_default_box(mut self, docking_box: BindingBox) -> Self {
        self.default_box = Some(docking_box);
        self
    }

    pub fn with_pocket_method(mut self, method: PocketMethod) -> Self {
        self.pocket_method = Some(method);
        self
    }

    pub fn with_receptor_meta(mut self, meta: ReceptorMeta) -> Self {
        self.receptor_meta = meta;
        self
    }
}
