//! Post-transition actions.
//!
//! Actions run after a transition has been durably recorded. Handler
//! execution is NOT an action: the executor invokes handlers explicitly at
//! the call site after the `in_progress` transition, so execution
//! triggering stays visible in the orchestration flow.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::errors::StateMachineResult;
use crate::constants::events;
use crate::events::EventPublisher;
use crate::models::{Task, WorkflowStep};

/// Work performed after a recorded transition
#[async_trait]
pub trait StateAction<E>: Send + Sync {
    async fn execute(
        &self,
        entity: &E,
        from_state: Option<String>,
        to_state: String,
        event: &str,
    ) -> StateMachineResult<()>;

    /// Description for logging
    fn description(&self) -> &'static str;
}

/// Publish the transition on the lifecycle event bus
pub struct PublishTransitionEventAction {
    publisher: EventPublisher,
}

impl PublishTransitionEventAction {
    pub fn new(publisher: EventPublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl StateAction<Task> for PublishTransitionEventAction {
    async fn execute(
        &self,
        task: &Task,
        from_state: Option<String>,
        to_state: String,
        event: &str,
    ) -> StateMachineResult<()> {
        self.publisher
            .publish(
                events::TASK_TRANSITION,
                json!({
                    "task_id": task.task_id,
                    "task_uuid": task.task_uuid,
                    "from_state": from_state,
                    "to_state": to_state,
                    "event": event,
                }),
            )
            .await?;
        Ok(())
    }

    fn description(&self) -> &'static str {
        "publish task transition event"
    }
}

#[async_trait]
impl StateAction<WorkflowStep> for PublishTransitionEventAction {
    async fn execute(
        &self,
        step: &WorkflowStep,
        from_state: Option<String>,
        to_state: String,
        event: &str,
    ) -> StateMachineResult<()> {
        self.publisher
            .publish(
                events::STEP_TRANSITION,
                json!({
                    "task_id": step.task_id,
                    "step_id": step.workflow_step_id,
                    "step_name": step.name,
                    "from_state": from_state,
                    "to_state": to_state,
                    "event": event,
                }),
            )
            .await?;
        Ok(())
    }

    fn description(&self) -> &'static str {
        "publish step transition event"
    }
}

/// Structured trace line for every applied transition
pub struct TraceTransitionAction;

#[async_trait]
impl StateAction<Task> for TraceTransitionAction {
    async fn execute(
        &self,
        task: &Task,
        from_state: Option<String>,
        to_state: String,
        _event: &str,
    ) -> StateMachineResult<()> {
        debug!(
            task_id = task.task_id,
            from = from_state.as_deref().unwrap_or("none"),
            to = %to_state,
            "Task transition applied"
        );
        Ok(())
    }

    fn description(&self) -> &'static str {
        "trace task transition"
    }
}

#[async_trait]
impl StateAction<WorkflowStep> for TraceTransitionAction {
    async fn execute(
        &self,
        step: &WorkflowStep,
        from_state: Option<String>,
        to_state: String,
        _event: &str,
    ) -> StateMachineResult<()> {
        debug!(
            task_id = step.task_id,
            step_id = step.workflow_step_id,
            step_name = %step.name,
            from = from_state.as_deref().unwrap_or("none"),
            to = %to_state,
            "Step transition applied"
        );
        Ok(())
    }

    fn description(&self) -> &'static str {
        "trace step transition"
    }
}
