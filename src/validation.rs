//! Input validation for submissions
//!
//! Everything here runs synchronously before any record is written, so a
//! rejected submission never produces runs or queue deliveries.

use crate::error::{DockingError, Result};
use crate::models::{NewLigand, RunOptions};

/// Maximum accepted length of a line-notation (SMILES) string
pub const MAX_SMILES_CHARS: usize = 1000;

/// Maximum accepted size of a structure block (molfile)
pub const MAX_MOLFILE_CHARS: usize = 100_000;

/// Validates raw ligand input: at least one representation, both within limits
pub fn validate_ligand_input(input: &NewLigand) -> Result<()> {
    let smiles = non_blank(input.smiles.as_deref());
    let molfile = non_blank(input.molfile.as_deref());

    if smiles.is_none() && molfile.is_none() {
        return Err(DockingError::InvalidInput(
            "smiles or molfile is required".to_string(),
        ));
    }

    if let Some(smiles) = smiles {
        if smiles.chars().count() > MAX_SMILES_CHARS {
            return Err(DockingError::InvalidInput(format!(
                "SMILES too long (max {MAX_SMILES_CHARS} characters)"
            )));
        }
    }

    if let Some(molfile) = molfile {
        if molfile.len() > MAX_MOLFILE_CHARS {
            return Err(DockingError::InvalidInput(format!(
                "Molfile too large (max {MAX_MOLFILE_CHARS} characters)"
            )));
        }
    }

    Ok(())
}

/// Validates resolved run options; every count must be at least one
pub fn validate_run_options(options: &RunOptions) -> Result<()> {
    for (field, value) in [
        ("num_conformers", options.num_conformers),
        ("exhaustiveness", options.exhaustiveness),
        ("num_poses", options.num_poses),
    ] {
        if value == 0 {
            return Err(DockingError::InvalidInput(format!(
                "{field} must be at least 1"
            )));
        }
    }
    Ok(())
}

/// Validates that a protein selection is present and free of duplicates
pub fn validate_protein_selection(protein_ids: &[String]) -> Result<()> {
    if protein_ids.is_empty() {
        return Err(DockingError::InvalidInput(
            "protein_ids is required".to_string(),
        ));
    }

    let mut seen = std::collections::HashSet::with_capacity(protein_ids.len());
    for id in protein_ids {
        if !seen.insert(id.as_str()) {
            return Err(DockingError::InvalidInput(format!(
                "protein {id} selected more than once"
            )));
        }
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ligand(smiles: Option<&str>, molfile: Option<&str>) -> NewLigand {
        NewLigand {
            name: None,
            smiles: smiles.map(str::to_string),
            molfile: molfile.map(str::to_string),
        }
    }

    #[test]
    fn test_ligand_requires_a_representation() {
        assert!(validate_ligand_input(&ligand(None, None)).is_err());
        assert!(validate_ligand_input(&ligand(Some("   "), None)).is_err());
        assert!(validate_ligand_input(&ligand(Some("CCO"), None)).is_ok());
        assert!(validate_ligand_input(&ligand(None, Some("mol\nblock"))).is_ok());
    }

    #[test]
    fn test_ligand_size_limits() {
        let long_smiles = "C".repeat(MAX_SMILES_CHARS + 1);
        assert!(validate_ligand_input(&ligand(Some(&long_smiles), None)).is_err());

        let big_molfile = "x".repeat(MAX_MOLFILE_CHARS + 1);
        assert!(validate_ligand_input(&ligand(None, Some(&big_molfile))).is_err());
    }

    #[test]
    fn test_zero_valued_options_rejected() {
        let options = RunOptions {
            num_conformers: 0,
            exhaustiveness: 4,
            num_poses: 5,
        };
        let err = validate_run_options(&options).unwrap_err();
        assert!(err.to_string().contains("num_conformers"));
    }

    #[test]
    fn test_protein_selection() {
        assert!(validate_protein_selection(&[]).is_err());
        assert!(validate_protein_selection(&["a".into(), "a".into()]).is_err());
        assert!(validate_protein_selection(&["a".into(), "b".into()]).is_ok());
    }
}
