pub mod batch;
pub mod conformer;
pub mod ligand;
pub mod protein;
pub mod result;
pub mod run;
pub mod task;

// Re-export core models for easy access
pub use batch::Batch;
pub use conformer::Conformer;
pub use ligand::{Ligand, NewLigand};
pub use protein::{BindingBox, PocketMethod, Protein, ReceptorMeta};
pub use result::DockingResult;
pub use run::{Run, RunOptionOverrides, RunOptions};
pub use task::Task;
