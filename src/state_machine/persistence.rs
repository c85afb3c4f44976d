//! Transition recording.
//!
//! Every applied transition is durably appended to the entity's transition
//! log before actions run. The log is immutable and per-entity ordered; it
//! is the audit trail and the source of truth for current state.

use super::errors::StateMachineResult;
use super::events::{StepEvent, TaskEvent};
use super::states::{TaskState, WorkflowStepState};
use crate::models::{NewStepTransition, NewTaskTransition, StepTransition, TaskTransition};
use crate::store::WorkflowStore;

/// Records task transitions
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskTransitionRecorder;

impl TaskTransitionRecorder {
    pub async fn record(
        &self,
        store: &dyn WorkflowStore,
        task_id: i64,
        from_state: Option<TaskState>,
        to_state: TaskState,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskTransition> {
        let event_json = serde_json::to_string(event)?;
        let transition = store
            .append_task_transition(NewTaskTransition {
                task_id,
                from_state,
                to_state,
                event: event_json,
                reason: event.error_message().map(str::to_string),
            })
            .await?;
        Ok(transition)
    }
}

/// Records workflow step transitions
#[derive(Debug, Clone, Copy, Default)]
pub struct StepTransitionRecorder;

impl StepTransitionRecorder {
    pub async fn record(
        &self,
        store: &dyn WorkflowStore,
        workflow_step_id: i64,
        from_state: Option<WorkflowStepState>,
        to_state: WorkflowStepState,
        event: &StepEvent,
    ) -> StateMachineResult<StepTransition> {
        let event_json = serde_json::to_string(event)?;
        let transition = store
            .append_step_transition(NewStepTransition {
                workflow_step_id,
                from_state,
                to_state,
                event: event_json,
                reason: event.error_message().map(str::to_string),
            })
            .await?;
        Ok(transition)
    }
}
