use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one successful task. At most one live result exists per task;
/// writing a new one replaces the previous row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingResult {
    pub result_id: Uuid,
    pub task_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Lower is better; `None` when the engine reported no pose
    pub best_score: Option<f64>,
    /// Pose artifacts, relative to the object store
    pub pose_paths: Vec<String>,
    /// Opaque engine metrics plus the box-resolution metadata
    pub metrics: serde_json::Value,
}

impl DockingResult {
    pub fn new(
        task_id: Uuid,
        best_score: Option<f64>,
        pose_paths: Vec<String>,
        metrics: serde_json::Value,
    ) -> Self {
        Self {
            result_id: Uuid::new_v4(),
            task_id,
            created_at: Utc::now(),
            best_score,
            pose_paths,
            metrics,
        }
    }
}
