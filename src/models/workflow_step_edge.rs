use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::system::PROVIDES_EDGE_NAME;

/// A dependency edge in a task's DAG: `from_step` must reach a
/// terminal-success state before `to_step` becomes ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepEdge {
    pub workflow_step_edge_id: i64,
    pub task_id: i64,
    pub from_step_id: i64,
    pub to_step_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Insertable edge data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflowStepEdge {
    pub task_id: i64,
    pub from_step_id: i64,
    pub to_step_id: i64,
    pub name: String,
}

impl NewWorkflowStepEdge {
    /// A standard "provides" dependency edge
    pub fn provides(task_id: i64, from_step_id: i64, to_step_id: i64) -> Self {
        Self {
            task_id,
            from_step_id,
            to_step_id,
            name: PROVIDES_EDGE_NAME.to_string(),
        }
    }
}
