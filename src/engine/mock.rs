//! Deterministic engine for development and tests. Scores are derived from a
//! SHA-256 digest of the task, ligand and protein ids, so reruns of the same
//! task always agree.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::preparer::placeholder_pdb;
use super::{DockingEngine, EngineError, EngineOutput, EngineRequest};

#[derive(Debug, Clone, Default)]
pub struct MockEngine;

impl MockEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score in `(-10.0, 0.0]`: first 24 digest bits mod 1000, over 100, negated
    pub fn score_for(task_id: Uuid, ligand_id: Uuid, protein_id: &str) -> f64 {
        let digest = Sha256::digest(format!("{task_id}:{ligand_id}:{protein_id}").as_bytes());
        let value = (u32::from(digest[0]) << 16) | (u32::from(digest[1]) << 8) | u32::from(digest[2]);
        -f64::from(value % 1000) / 100.0
    }
}

#[async_trait]
impl DockingEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn dock(
        &self,
        request: &EngineRequest,
        cancel: CancellationToken,
    ) -> Result<EngineOutput, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let pose = match &request.ligand {
            Some(ligand) => tokio::fs::read_to_string(ligand)
                .await
                .map_err(|e| EngineError::MissingInput(format!("{}: {e}", ligand.display())))?,
            None => placeholder_pdb(&request.ligand_name),
        };

        let pose_path = request.output_dir.join("pose_0.pdb");
        tokio::fs::write(&pose_path, pose)
            .await
            .map_err(|e| EngineError::Io(format!("{}: {e}", pose_path.display())))?;

        Ok(EngineOutput {
            best_score: Some(Self::score_for(
                request.task_id,
                request.ligand_id,
                &request.protein_id,
            )),
            pose_files: vec![pose_path],
            metrics: serde_json::json!({ "mock": true }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_deterministic_and_bounded() {
        let task = Uuid::new_v4();
        let ligand = Uuid::new_v4();
        let first = MockEngine::score_for(task, ligand, "P1");
        assert_eq!(first, MockEngine::score_for(task, ligand, "P1"));
        assert!(first <= 0.0 && first > -10.0);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let request = EngineRequest {
            task_id: Uuid::new_v4(),
            ligand_id: Uuid::new_v4(),
            protein_id: "P1".to_string(),
            ligand_name: "lig".to_string(),
            receptor: dir.path().join("receptor.pdbqt"),
            ligand: None,
            docking_box: crate::models::BindingBox::origin_cube(20.0),
            exhaustiveness: 1,
            num_poses: 1,
            output_dir: dir.path().to_path_buf(),
        };
        let token = CancellationToken::new();
        token.cancel();

        let result = MockEngine::new().dock(&request, token).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(!dir.path().join("pose_0.pdb").exists());
    }
}
