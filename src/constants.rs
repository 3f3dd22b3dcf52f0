//! # System Constants
//!
//! Fixed names and layout conventions shared by the executor, the resolver
//! and the storage adapters.

/// Residue names treated as solvent when scanning `HETATM` records
pub const WATER_RESIDUES: [&str; 3] = ["HOH", "WAT", "DOD"];

/// Artifact store layout, all paths relative to the object store root
pub mod artifacts {
    use uuid::Uuid;

    pub fn conformer_pdb(ligand_id: Uuid, index: u32) -> String {
        format!("ligands/{ligand_id}/conf_{index}.pdb")
    }

    pub fn conformer_pdbqt(ligand_id: Uuid, index: u32) -> String {
        format!("ligands/{ligand_id}/conf_{index}.pdbqt")
    }

    pub fn pose_dir(task_id: Uuid) -> String {
        format!("poses/{task_id}")
    }

    pub fn task_log(task_id: Uuid) -> String {
        format!("logs/{task_id}.txt")
    }
}

/// Error text recorded on a task for unexpected failures; details go to the log
pub const SYSTEM_ERROR_MESSAGE: &str = "Internal error during task execution";

/// Name of the protein manifest inside the protein library
pub const PROTEIN_MANIFEST_FILE: &str = "manifest.json";

/// Default presets, overridable through configuration
pub mod presets {
    pub const FAST: &str = "fast";
    pub const BALANCED: &str = "balanced";
    pub const THOROUGH: &str = "thorough";
}

/// Operation names used in structured log records
pub mod operations {
    pub const BUILD_RUN: &str = "build_run";
    pub const BUILD_BATCH: &str = "build_batch";
    pub const EXECUTE_TASK: &str = "execute_task";
    pub const CANCEL_TASK: &str = "cancel_task";
    pub const CANCEL_RUN: &str = "cancel_run";
    pub const AGGREGATE_RUN: &str = "aggregate_run";
    pub const SEED_PROTEINS: &str = "seed_proteins";
}
