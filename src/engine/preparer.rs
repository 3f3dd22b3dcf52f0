//! Ligand structure preparation: raw representation in, `.pdb` plus
//! engine-ready `.pdbqt` out.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::models::Ligand;

#[derive(Debug, Error)]
pub enum PreparationError {
    #[error("Invalid ligand input: {0}")]
    InvalidInput(String),

    #[error("{tool} failed: {stderr}")]
    Tool { tool: String, stderr: String },

    #[error("Preparation I/O failed: {0}")]
    Io(String),

    #[error("Preparation cancelled")]
    Cancelled,
}

#[async_trait]
pub trait StructurePreparer: Send + Sync {
    /// Write the structure for conformer `index` to both output paths
    async fn prepare(
        &self,
        ligand: &Ligand,
        index: u32,
        pdb_out: &Path,
        pdbqt_out: &Path,
        cancel: CancellationToken,
    ) -> Result<(), PreparationError>;
}

/// Minimal two-atom structure block used when no real geometry is available
pub fn placeholder_pdb(ligand_name: &str) -> String {
    format!(
        "HEADER    LIGAND\n\
         REMARK    {ligand_name}\n\
         ATOM      1  C   LIG A   1       0.000   0.000   0.000  1.00  0.00           C\n\
         ATOM      2  O   LIG A   1       1.200   0.000   0.000  1.00  0.00           O\n\
         TER\n\
         END\n"
    )
}

async fn write_file(path: &Path, contents: &str) -> Result<(), PreparationError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PreparationError::Io(format!("{}: {e}", parent.display())))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| PreparationError::Io(format!("{}: {e}", path.display())))
}

/// Writes the placeholder block to both outputs; needs no external tools
#[derive(Debug, Clone, Default)]
pub struct PlaceholderPreparer;

#[async_trait]
impl StructurePreparer for PlaceholderPreparer {
    async fn prepare(
        &self,
        ligand: &Ligand,
        _index: u32,
        pdb_out: &Path,
        pdbqt_out: &Path,
        _cancel: CancellationToken,
    ) -> Result<(), PreparationError> {
        let block = placeholder_pdb(&ligand.display_name());
        write_file(pdb_out, &block).await?;
        write_file(pdbqt_out, &block).await
    }
}

/// Open Babel adapter: 3D embedding from SMILES or molfile, then PDBQT conversion
#[derive(Debug, Clone)]
pub struct ObabelPreparer {
    executable_path: PathBuf,
}

impl ObabelPreparer {
    pub fn new<P: AsRef<Path>>(executable_path: P) -> Self {
        Self {
            executable_path: executable_path.as_ref().to_path_buf(),
        }
    }

    async fn run(&self, command: &mut Command, cancel: &CancellationToken) -> Result<(), PreparationError> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PreparationError::Tool {
                tool: self.executable_path.display().to_string(),
                stderr: e.to_string(),
            })?;

        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(|e| PreparationError::Io(e.to_string()))?
            }
            _ = cancel.cancelled() => return Err(PreparationError::Cancelled),
        };

        if !output.status.success() {
            return Err(PreparationError::Tool {
                tool: "obabel".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StructurePreparer for ObabelPreparer {
    async fn prepare(
        &self,
        ligand: &Ligand,
        index: u32,
        pdb_out: &Path,
        pdbqt_out: &Path,
        cancel: CancellationToken,
    ) -> Result<(), PreparationError> {
        if let Some(parent) = pdb_out.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PreparationError::Io(format!("{}: {e}", parent.display())))?;
        }

        let mut embed = Command::new(&self.executable_path);
        match (ligand.smiles.as_deref(), ligand.molfile.as_deref()) {
            (Some(smiles), _) if !smiles.trim().is_empty() => {
                embed.arg(format!("-:{}", smiles.trim()));
            }
            (_, Some(molfile)) if !molfile.trim().is_empty() => {
                let mol_path = pdb_out.with_extension("mol");
                write_file(&mol_path, molfile).await?;
                embed.arg("-imol").arg(&mol_path);
            }
            _ => {
                return Err(PreparationError::InvalidInput(
                    "no ligand representation".to_string(),
                ))
            }
        }
        embed
            .arg("-opdb")
            .arg("-O")
            .arg(pdb_out)
            .arg("--gen3d")
            .arg("-h")
            .arg("--seed")
            .arg(index.to_string());
        self.run(&mut embed, &cancel).await?;

        let mut convert = Command::new(&self.executable_path);
        convert
            .arg("-ipdb")
            .arg(pdb_out)
            .arg("-opdbqt")
            .arg("-O")
            .arg(pdbqt_out);
        self.run(&mut convert, &cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewLigand;

    #[tokio::test]
    async fn test_placeholder_writes_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let ligand = Ligand::from_new(NewLigand::from_smiles("caffeine", "CN1C=NC2=C1C(=O)N(C(=O)N2C)C"));
        let pdb = dir.path().join("ligands/x/conf_0.pdb");
        let pdbqt = dir.path().join("ligands/x/conf_0.pdbqt");

        PlaceholderPreparer
            .prepare(&ligand, 0, &pdb, &pdbqt, CancellationToken::new())
            .await
            .unwrap();

        let block = std::fs::read_to_string(&pdb).unwrap();
        assert!(block.contains("REMARK    caffeine"));
        assert_eq!(block, std::fs::read_to_string(&pdbqt).unwrap());
    }
}
