//! # Task Execution Context
//!
//! Aggregate rollup over a task's readiness snapshot. `execution_status` is
//! a pure function of the step-state multiset at query time and drives the
//! finalizer's decision table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BackoffConfig;
use crate::constants::{ExecutionStatus, HealthStatus, RecommendedAction};
use crate::state_machine::WorkflowStepState;
use crate::store::{StoreResult, WorkflowStore};

use super::StepReadinessStatus;

/// Derived per-task execution context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionContext {
    pub task_id: i64,
    pub total_steps: usize,
    pub pending_steps: usize,
    pub in_progress_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub ready_steps: usize,
    pub execution_status: ExecutionStatus,
    pub recommended_action: RecommendedAction,
    pub health_status: HealthStatus,
    pub completion_percentage: f64,
}

impl TaskExecutionContext {
    /// Roll up a readiness snapshot into the task-level context. Pure.
    pub fn from_readiness(task_id: i64, readiness: &[StepReadinessStatus]) -> Self {
        let total_steps = readiness.len();
        let ready_steps = readiness.iter().filter(|r| r.ready_for_execution).count();
        let pending_steps = readiness
            .iter()
            .filter(|r| r.current_state == WorkflowStepState::Pending)
            .count();
        let in_progress_steps = readiness
            .iter()
            .filter(|r| r.current_state.is_active() || r.in_process)
            .count();
        let completed_steps = readiness
            .iter()
            .filter(|r| r.current_state.is_terminal())
            .count();
        let failed_steps = readiness
            .iter()
            .filter(|r| r.current_state.is_error())
            .count();
        let permanently_blocked = readiness.iter().filter(|r| r.permanently_blocked()).count();
        let waiting_for_retry = readiness.iter().filter(|r| r.waiting_for_retry()).count();

        // Decision order matters: in-flight work and ready work always win
        // over failure accounting, and a surviving retryable failure keeps
        // the task out of the blocked state.
        let execution_status = if total_steps == completed_steps {
            ExecutionStatus::AllComplete
        } else if ready_steps > 0 {
            ExecutionStatus::HasReadySteps
        } else if in_progress_steps > 0 {
            ExecutionStatus::Processing
        } else if permanently_blocked > 0 && waiting_for_retry == 0 {
            ExecutionStatus::BlockedByFailures
        } else {
            ExecutionStatus::WaitingForDependencies
        };

        let recommended_action = match execution_status {
            ExecutionStatus::AllComplete => RecommendedAction::FinalizeTask,
            ExecutionStatus::HasReadySteps => RecommendedAction::ExecuteReadySteps,
            ExecutionStatus::Processing => RecommendedAction::WaitForCompletion,
            ExecutionStatus::WaitingForDependencies => RecommendedAction::WaitForDependencies,
            ExecutionStatus::BlockedByFailures => RecommendedAction::HandleFailures,
        };

        let health_status = match execution_status {
            ExecutionStatus::BlockedByFailures => HealthStatus::Blocked,
            _ if waiting_for_retry > 0 => HealthStatus::Recovering,
            ExecutionStatus::AllComplete
            | ExecutionStatus::HasReadySteps
            | ExecutionStatus::Processing
            | ExecutionStatus::WaitingForDependencies => HealthStatus::Healthy,
        };

        let completion_percentage = if total_steps > 0 {
            completed_steps as f64 / total_steps as f64 * 100.0
        } else {
            100.0
        };

        Self {
            task_id,
            total_steps,
            pending_steps,
            in_progress_steps,
            completed_steps,
            failed_steps,
            ready_steps,
            execution_status,
            recommended_action,
            health_status,
            completion_percentage,
        }
    }

    /// Load a fresh context for a task from the store
    pub async fn for_task(
        store: &dyn WorkflowStore,
        task_id: i64,
        backoff: &BackoffConfig,
        now: DateTime<Utc>,
    ) -> StoreResult<TaskExecutionContext> {
        let readiness = StepReadinessStatus::for_task(store, task_id, backoff, now).await?;
        Ok(Self::from_readiness(task_id, &readiness))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{WorkflowStep, WorkflowStepEdge};
    use crate::state_machine::WorkflowStepState;
    use std::collections::HashMap;

    struct Fixture {
        steps: Vec<WorkflowStep>,
        edges: Vec<WorkflowStepEdge>,
        states: HashMap<i64, WorkflowStepState>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                steps: Vec::new(),
                edges: Vec::new(),
                states: HashMap::new(),
            }
        }

        fn step(
            mut self,
            id: i64,
            state: WorkflowStepState,
            attempts: i32,
            retryable: bool,
        ) -> Self {
            let mut step = WorkflowStep {
                workflow_step_id: id,
                task_id: 1,
                name: format!("step_{id}"),
                handler_name: "handler".to_string(),
                attempts,
                retry_limit: 3,
                retryable,
                in_process: false,
                processed: state.satisfies_dependencies(),
                backoff_request_seconds: None,
                last_attempted_at: (attempts > 0).then(Utc::now),
                timeout_seconds: None,
                inputs: None,
                results: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            if state.is_active() {
                step.in_process = true;
            }
            self.states.insert(id, state);
            self.steps.push(step);
            self
        }

        fn edge(mut self, from: i64, to: i64) -> Self {
            self.edges.push(WorkflowStepEdge {
                workflow_step_edge_id: 1000 + from * 10 + to,
                task_id: 1,
                from_step_id: from,
                to_step_id: to,
                name: "provides".to_string(),
                created_at: Utc::now(),
            });
            self
        }

        fn context(&self) -> TaskExecutionContext {
            let rows = StepReadinessStatus::compute_for_task(
                &self.steps,
                &self.edges,
                &self.states,
                &BackoffConfig::default(),
                Utc::now(),
            );
            TaskExecutionContext::from_readiness(1, &rows)
        }
    }

    #[test]
    fn all_complete_when_every_step_terminal() {
        let context = Fixture::new()
            .step(1, WorkflowStepState::Complete, 1, true)
            .step(2, WorkflowStepState::Complete, 1, true)
            .context();
        assert_eq!(context.execution_status, ExecutionStatus::AllComplete);
        assert_eq!(context.recommended_action, RecommendedAction::FinalizeTask);
        assert_eq!(context.completion_percentage, 100.0);
    }

    #[test]
    fn ready_steps_win_over_everything_else() {
        let context = Fixture::new()
            .step(1, WorkflowStepState::Complete, 1, true)
            .step(2, WorkflowStepState::Pending, 0, true)
            .context();
        assert_eq!(context.execution_status, ExecutionStatus::HasReadySteps);
        assert_eq!(context.ready_steps, 1);
    }

    #[test]
    fn retryable_failure_reports_waiting_never_blocked() {
        // One failed step with attempts < retry_limit, inside its backoff
        // window: the crux of correct retry semantics.
        let context = Fixture::new()
            .step(1, WorkflowStepState::Error, 1, true)
            .context();
        assert_eq!(
            context.execution_status,
            ExecutionStatus::WaitingForDependencies
        );
        assert_eq!(context.health_status, HealthStatus::Recovering);
    }

    #[test]
    fn exhausted_failure_blocks_the_task() {
        let context = Fixture::new()
            .step(1, WorkflowStepState::Error, 3, true)
            .context();
        assert_eq!(context.execution_status, ExecutionStatus::BlockedByFailures);
        assert_eq!(context.recommended_action, RecommendedAction::HandleFailures);
        assert_eq!(context.health_status, HealthStatus::Blocked);
    }

    #[test]
    fn non_retryable_failure_blocks_even_with_attempts_left() {
        let context = Fixture::new()
            .step(1, WorkflowStepState::Error, 1, false)
            .context();
        assert_eq!(context.execution_status, ExecutionStatus::BlockedByFailures);
    }

    #[test]
    fn surviving_retry_branch_keeps_task_waiting() {
        // One branch exhausted, the other still retry-eligible: the task is
        // not yet blocked because progress is still possible.
        let context = Fixture::new()
            .step(1, WorkflowStepState::Error, 3, true)
            .step(2, WorkflowStepState::Error, 1, true)
            .context();
        assert_eq!(
            context.execution_status,
            ExecutionStatus::WaitingForDependencies
        );
    }

    #[test]
    fn in_flight_steps_report_processing() {
        let context = Fixture::new()
            .step(1, WorkflowStepState::InProgress, 0, true)
            .step(2, WorkflowStepState::Pending, 0, true)
            .edge(1, 2)
            .context();
        assert_eq!(context.execution_status, ExecutionStatus::Processing);
    }

    #[test]
    fn blocked_convergence_behind_exhausted_branch() {
        // Diamond: 1 -> {2, 3} -> 4, branch 3 exhausted. The convergence
        // step stays pending forever and the task is blocked.
        let context = Fixture::new()
            .step(1, WorkflowStepState::Complete, 0, true)
            .step(2, WorkflowStepState::Complete, 0, true)
            .step(3, WorkflowStepState::Error, 3, true)
            .step(4, WorkflowStepState::Pending, 0, true)
            .edge(1, 2)
            .edge(1, 3)
            .edge(2, 4)
            .edge(3, 4)
            .context();
        assert_eq!(context.execution_status, ExecutionStatus::BlockedByFailures);
    }

    #[test]
    fn zero_step_task_is_complete() {
        let context = Fixture::new().context();
        assert_eq!(context.execution_status, ExecutionStatus::AllComplete);
        assert_eq!(context.completion_percentage, 100.0);
    }
}
