use super::status::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot of one background task as seen by a polling caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub task_type: String,
    pub status: TaskStatus,
    /// Fraction complete in [0.0, 1.0]
    pub progress: f64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TaskRecord {
    pub(crate) fn new(task_id: String, task_type: &str, metadata: Map<String, Value>) -> Self {
        Self {
            task_id,
            task_type: task_type.to_string(),
            status: TaskStatus::Pending,
            progress: 0.0,
            message: format!("{task_type} task created"),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
            metadata,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time between start and completion, when both are known
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }
}
