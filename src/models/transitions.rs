//! Append-only transition log rows for tasks and workflow steps.
//!
//! The transition log is the source of truth for entity state: current
//! state = the `to_state` of the most recent transition. Rows are immutable
//! once written; the store maintains a per-entity monotonic `sort_key` and
//! the `most_recent` flag on append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state_machine::{TaskState, WorkflowStepState};

/// One recorded task state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTransition {
    pub task_transition_id: i64,
    pub task_id: i64,
    /// None for the initial transition
    pub from_state: Option<TaskState>,
    pub to_state: TaskState,
    /// Serialized triggering event, for audit
    pub event: String,
    pub reason: Option<String>,
    /// Monotonic per-task ordering key
    pub sort_key: i32,
    pub most_recent: bool,
    pub created_at: DateTime<Utc>,
}

/// Insertable task transition data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTaskTransition {
    pub task_id: i64,
    pub from_state: Option<TaskState>,
    pub to_state: TaskState,
    pub event: String,
    pub reason: Option<String>,
}

/// One recorded workflow step state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTransition {
    pub step_transition_id: i64,
    pub workflow_step_id: i64,
    /// None for the initial transition
    pub from_state: Option<WorkflowStepState>,
    pub to_state: WorkflowStepState,
    /// Serialized triggering event, for audit
    pub event: String,
    pub reason: Option<String>,
    /// Monotonic per-step ordering key
    pub sort_key: i32,
    pub most_recent: bool,
    pub created_at: DateTime<Utc>,
}

/// Insertable step transition data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStepTransition {
    pub workflow_step_id: i64,
    pub from_state: Option<WorkflowStepState>,
    pub to_state: WorkflowStepState,
    pub event: String,
    pub reason: Option<String>,
}
