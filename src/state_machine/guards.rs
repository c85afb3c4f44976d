//! Transition guards.
//!
//! Guards re-check durable state at transition time so that concurrent
//! passes racing on the same entity cannot both apply the same transition.
//! A guard rejection is an expected outcome, surfaced as
//! [`StateMachineError::GuardRejected`] and consumed by `safe_transition`.

use async_trait::async_trait;

use super::errors::{StateMachineError, StateMachineResult};
use super::states::{TaskState, WorkflowStepState};
use crate::models::{Task, WorkflowStep};
use crate::store::WorkflowStore;

/// A condition that must hold for a transition to be applied
#[async_trait]
pub trait TransitionGuard<E>: Send + Sync {
    async fn check(&self, entity: &E, store: &dyn WorkflowStore) -> StateMachineResult<()>;

    /// Description for logging
    fn description(&self) -> &'static str;
}

/// Every workflow step must be terminal before a task may complete
pub struct AllStepsCompleteGuard;

#[async_trait]
impl TransitionGuard<Task> for AllStepsCompleteGuard {
    async fn check(&self, task: &Task, store: &dyn WorkflowStore) -> StateMachineResult<()> {
        let states = store.current_step_states(task.task_id).await?;
        let incomplete = states.values().filter(|s| !s.is_terminal()).count();
        if incomplete > 0 {
            return Err(StateMachineError::GuardRejected {
                reason: format!(
                    "task {} has {} incomplete workflow steps",
                    task.task_id, incomplete
                ),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "all workflow steps must be complete"
    }
}

/// A task must not already be mid-pass when a pass starts
pub struct TaskNotAlreadyInProgressGuard;

#[async_trait]
impl TransitionGuard<Task> for TaskNotAlreadyInProgressGuard {
    async fn check(&self, task: &Task, store: &dyn WorkflowStore) -> StateMachineResult<()> {
        let current = store.current_task_state(task.task_id).await?;
        if current == Some(TaskState::InProgress) {
            return Err(StateMachineError::GuardRejected {
                reason: format!("task {} is already in progress", task.task_id),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "task must not already be in progress"
    }
}

/// Every parent must be in a terminal-success state before a step starts
pub struct StepDependenciesMetGuard;

#[async_trait]
impl TransitionGuard<WorkflowStep> for StepDependenciesMetGuard {
    async fn check(&self, step: &WorkflowStep, store: &dyn WorkflowStore) -> StateMachineResult<()> {
        let edges = store.edges_for_task(step.task_id).await?;
        let states = store.current_step_states(step.task_id).await?;
        let unmet = edges
            .iter()
            .filter(|edge| edge.to_step_id == step.workflow_step_id)
            .filter(|edge| {
                !states
                    .get(&edge.from_step_id)
                    .copied()
                    .unwrap_or_default()
                    .satisfies_dependencies()
            })
            .count();
        if unmet > 0 {
            return Err(StateMachineError::GuardRejected {
                reason: format!(
                    "step {} has {} unmet dependencies",
                    step.workflow_step_id, unmet
                ),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "all step dependencies must be satisfied"
    }
}

/// A step must not already be executing when it starts
pub struct StepNotAlreadyInProgressGuard;

#[async_trait]
impl TransitionGuard<WorkflowStep> for StepNotAlreadyInProgressGuard {
    async fn check(&self, step: &WorkflowStep, store: &dyn WorkflowStore) -> StateMachineResult<()> {
        let current = store.current_step_state(step.workflow_step_id).await?;
        if current == Some(WorkflowStepState::InProgress) {
            return Err(StateMachineError::GuardRejected {
                reason: format!("step {} is already in progress", step.workflow_step_id),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "step must not already be in progress"
    }
}

/// A failed step may only restart while its retry budget remains
pub struct StepRetryEligibleGuard;

#[async_trait]
impl TransitionGuard<WorkflowStep> for StepRetryEligibleGuard {
    async fn check(&self, step: &WorkflowStep, store: &dyn WorkflowStore) -> StateMachineResult<()> {
        // Re-read the scalar fields; the in-memory copy may be stale.
        let fresh = store
            .step(step.workflow_step_id)
            .await?
            .ok_or(crate::store::StoreError::StepNotFound(step.workflow_step_id))?;
        if fresh.retries_exhausted() {
            return Err(StateMachineError::GuardRejected {
                reason: format!(
                    "step {} has exhausted retries ({}/{}, retryable={})",
                    fresh.workflow_step_id, fresh.attempts, fresh.retry_limit, fresh.retryable
                ),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "step must be retry-eligible"
    }
}
