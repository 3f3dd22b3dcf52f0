use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::ConformerStatus;

/// One generated 3D geometry of a ligand.
///
/// Indices are dense per ligand (`0..N-1`). Conformers are never deleted and
/// are shared by every run against the same ligand that needs at least that
/// many of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conformer {
    pub conformer_id: Uuid,
    pub ligand_id: Uuid,
    pub idx: u32,
    pub status: ConformerStatus,
    /// Structure artifact, relative to the object store
    pub pdb_path: Option<String>,
    /// Engine-ready artifact, relative to the object store
    pub pdbqt_path: Option<String>,
}

impl Conformer {
    pub fn new(ligand_id: Uuid, idx: u32) -> Self {
        Self {
            conformer_id: Uuid::new_v4(),
            ligand_id,
            idx,
            status: ConformerStatus::Pending,
            pdb_path: None,
            pdbqt_path: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ConformerStatus::Ready && self.pdbqt_path.is_some()
    }

    pub fn mark_ready(&mut self, pdb_path: String, pdbqt_path: String) {
        self.pdb_path = Some(pdb_path);
        self.pdbqt_path = Some(pdbqt_path);
        self.status = ConformerStatus::Ready;
    }
}
