//! AutoDock Vina process adapter.
//!
//! The child process is spawned with `kill_on_drop`, so cancelling the token
//! (or dropping the delivery future at the hard time limit) terminates it.
//! An optional process timeout kills it the same way.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{DockingEngine, EngineError, EngineOutput, EngineRequest};

const POSES_FILE: &str = "poses.pdbqt";

#[derive(Debug, Clone)]
pub struct VinaEngine {
    executable_path: PathBuf,
    timeout: Option<Duration>,
}

impl VinaEngine {
    pub fn new<P: AsRef<Path>>(executable_path: P) -> Self {
        Self {
            executable_path: executable_path.as_ref().to_path_buf(),
            timeout: None,
        }
    }

    /// Kill the process when it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, request: &EngineRequest, ligand: &Path, out: &Path) -> Command {
        let [cx, cy, cz] = request.docking_box.center;
        let [sx, sy, sz] = request.docking_box.size;

        let mut command = Command::new(&self.executable_path);
        command
            .arg("--receptor")
            .arg(&request.receptor)
            .arg("--ligand")
            .arg(ligand)
            .arg("--center_x")
            .arg(cx.to_string())
            .arg("--center_y")
            .arg(cy.to_string())
            .arg("--center_z")
            .arg(cz.to_string())
            .arg("--size_x")
            .arg(sx.to_string())
            .arg("--size_y")
            .arg(sy.to_string())
            .arg("--size_z")
            .arg(sz.to_string())
            .arg("--exhaustiveness")
            .arg(request.exhaustiveness.to_string())
            .arg("--num_modes")
            .arg(request.num_poses.to_string())
            .arg("--out")
            .arg(out)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// Affinities from Vina's result table, in mode order.
///
/// ```text
/// mode |   affinity | dist from best mode
///      | (kcal/mol) | rmsd l.b.| rmsd u.b.
/// -----+------------+----------+----------
///    1       -7.2      0.000      0.000
/// ```
pub fn parse_affinities(stdout: &str) -> Vec<f64> {
    stdout
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("-----+"))
        .skip(1)
        .map_while(|line| {
            let mut fields = line.split_whitespace();
            fields.next()?.parse::<u32>().ok()?;
            fields.next()?.parse::<f64>().ok()
        })
        .collect()
}

#[async_trait]
impl DockingEngine for VinaEngine {
    fn name(&self) -> &'static str {
        "vina"
    }

    async fn dock(
        &self,
        request: &EngineRequest,
        cancel: CancellationToken,
    ) -> Result<EngineOutput, EngineError> {
        let ligand = request
            .ligand
            .as_deref()
            .ok_or_else(|| EngineError::MissingInput("prepared ligand".to_string()))?;
        if !ligand.exists() {
            return Err(EngineError::MissingInput(ligand.display().to_string()));
        }

        let out = request.output_dir.join(POSES_FILE);
        info!(task_id = %request.task_id, ligand = %ligand.display(), "Running AutoDock Vina");

        let child = self
            .command(request, ligand, &out)
            .spawn()
            .map_err(|e| EngineError::Spawn {
                program: self.executable_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let wait = async {
            let waited = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                    .await
                    .map_err(|_| EngineError::Timeout(limit))?,
                None => child.wait_with_output().await,
            };
            waited.map_err(|e| EngineError::Io(e.to_string()))
        };
        let output = tokio::select! {
            output = wait => output?,
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Process {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let affinities = parse_affinities(&stdout);
        if affinities.is_empty() {
            return Err(EngineError::Output(
                "no result table in Vina output".to_string(),
            ));
        }

        debug!(task_id = %request.task_id, modes = affinities.len(), "AutoDock Vina completed");
        Ok(EngineOutput {
            best_score: affinities.first().copied(),
            pose_files: vec![out],
            metrics: serde_json::json!({
                "engine": "vina",
                "exhaustiveness": request.exhaustiveness,
                "num_modes": request.num_poses,
                "affinities": affinities,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_table_is_parsed() {
        let stdout = "\
Performing docking (random seed: 42) ... done.

mode |   affinity | dist from best mode
     | (kcal/mol) | rmsd l.b.| rmsd u.b.
-----+------------+----------+----------
   1       -7.214          0          0
   2       -6.9        1.812      2.405
   3       -6.501      2.104      3.993
Writing output ... done.
";
        assert_eq!(parse_affinities(stdout), vec![-7.214, -6.9, -6.501]);
        assert!(parse_affinities("no table here").is_empty());
    }

    #[tokio::test]
    async fn test_missing_ligand_is_reported_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let request = EngineRequest {
            task_id: uuid::Uuid::new_v4(),
            ligand_id: uuid::Uuid::new_v4(),
            protein_id: "P1".to_string(),
            ligand_name: "lig".to_string(),
            receptor: dir.path().join("receptor.pdbqt"),
            ligand: Some(dir.path().join("missing.pdbqt")),
            docking_box: crate::models::BindingBox::origin_cube(20.0),
            exhaustiveness: 1,
            num_poses: 1,
            output_dir: dir.path().to_path_buf(),
        };
        let engine = VinaEngine::new("/nonexistent/vina");
        let result = engine.dock(&request, CancellationToken::new()).await;
        assert!(matches!(result, Err(EngineError::MissingInput(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_timeout_kills_engine() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-vina");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let ligand = dir.path().join("ligand.pdbqt");
        std::fs::write(&ligand, "REMARK ligand\n").unwrap();

        let request = EngineRequest {
            task_id: uuid::Uuid::new_v4(),
            ligand_id: uuid::Uuid::new_v4(),
            protein_id: "P1".to_string(),
            ligand_name: "lig".to_string(),
            receptor: dir.path().join("receptor.pdbqt"),
            ligand: Some(ligand),
            docking_box: crate::models::BindingBox::origin_cube(20.0),
            exhaustiveness: 1,
            num_poses: 1,
            output_dir: dir.path().to_path_buf(),
        };
        let engine = VinaEngine::new(&script).with_timeout(Some(Duration::from_millis(200)));
        let started = std::time::Instant::now();
        let result = engine.dock(&request, CancellationToken::new()).await;

        assert!(matches!(result, Err(EngineError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
