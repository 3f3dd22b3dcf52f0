//! # Conformer Cache
//!
//! Makes sure a ligand has at least N conformer records. Existing conformers
//! are never removed or regenerated, so a ligand docked at a small preset and
//! later at a larger one only pays for the difference. Structure generation
//! itself happens lazily in the executor.
//!
//! ```rust
//! use std::sync::Arc;
//! use docking_core::models::{Ligand, NewLigand};
//! use docking_core::orchestration::ConformerCache;
//! use docking_core::storage::MemoryStore;
//!
//! # tokio_test::block_on(async {
//! let cache = ConformerCache::new(Arc::new(MemoryStore::new()));
//! let ligand = Ligand::from_new(NewLigand::from_smiles("ethanol", "CCO"));
//!
//! assert_eq!(cache.ensure_conformers(&ligand, 5).await.unwrap().len(), 5);
//! assert_eq!(cache.ensure_conformers(&ligand, 2).await.unwrap().len(), 5);
//! # });
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::models::{Conformer, Ligand};
use crate::storage::{Store, StoreResult};

#[derive(Clone)]
pub struct ConformerCache {
    store: Arc<dyn Store>,
}

impl ConformerCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Conformers `0..max(existing, required_count)` ordered by index
    pub async fn ensure_conformers(
        &self,
        ligand: &Ligand,
        required_count: u32,
    ) -> StoreResult<Vec<Conformer>> {
        let existing = self.store.list_conformers(ligand.ligand_id).await?;
        let current = existing.len() as u32;
        if current >= required_count {
            return Ok(existing);
        }

        let missing: Vec<Conformer> = (current..required_count)
            .map(|idx| Conformer::new(ligand.ligand_id, idx))
            .collect();
        let inserted = self.store.insert_conformers(&missing).await?;

        debug!(
            ligand_id = %ligand.ligand_id,
            existing = current,
            required = required_count,
            inserted = inserted,
            "Extended conformer set"
        );

        // Re-read so racing fills converge on the stored rows
        self.store.list_conformers(ligand.ligand_id).await
    }
}
