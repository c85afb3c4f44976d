//! # Step Readiness Status
//!
//! Per-step readiness projection: dependency satisfaction, retry
//! eligibility, and the backoff window combined into the single
//! `ready_for_execution` decision.
//!
//! Readiness is a query result, not stored state. It is recomputed from the
//! authoritative step rows, dependency edges, and transition log on every
//! read, set-wise for a whole task in one pass, so the snapshot is
//! internally consistent and can never go stale independently of the
//! underlying steps.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::BackoffConfig;
use crate::state_machine::WorkflowStepState;
use crate::store::{StoreResult, WorkflowStore};

use super::{WorkflowStep, WorkflowStepEdge};

/// Readiness snapshot for one workflow step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReadinessStatus {
    pub workflow_step_id: i64,
    pub task_id: i64,
    pub name: String,
    pub current_state: WorkflowStepState,
    pub total_parents: usize,
    pub completed_parents: usize,
    /// True iff every parent is in a terminal-success state (vacuously true
    /// for root steps)
    pub dependencies_satisfied: bool,
    /// `attempts < retry_limit AND retryable`
    pub retry_eligible: bool,
    pub ready_for_execution: bool,
    pub attempts: i32,
    pub retry_limit: i32,
    pub in_process: bool,
    pub processed: bool,
    pub backoff_request_seconds: Option<i32>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// When the backoff window closes for a failed step
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl StepReadinessStatus {
    /// Compute readiness for every step of a task from already-loaded rows.
    /// Pure: no side effects, the clock is an explicit input.
    pub fn compute_for_task(
        steps: &[WorkflowStep],
        edges: &[WorkflowStepEdge],
        states: &HashMap<i64, WorkflowStepState>,
        backoff: &BackoffConfig,
        now: DateTime<Utc>,
    ) -> Vec<StepReadinessStatus> {
        let mut parents: HashMap<i64, Vec<i64>> = HashMap::new();
        for edge in edges {
            parents.entry(edge.to_step_id).or_default().push(edge.from_step_id);
        }

        steps
            .iter()
            .map(|step| {
                let step_parents = parents
                    .get(&step.workflow_step_id)
                    .map(|p| p.as_slice())
                    .unwrap_or(&[]);
                let total_parents = step_parents.len();
                let completed_parents = step_parents
                    .iter()
                    .filter(|parent_id| {
                        states
                            .get(*parent_id)
                            .copied()
                            .unwrap_or_default()
                            .satisfies_dependencies()
                    })
                    .count();
                let dependencies_satisfied = completed_parents == total_parents;

                let current_state = states
                    .get(&step.workflow_step_id)
                    .copied()
                    .unwrap_or_default();
                let retry_eligible = step.retry_eligible();

                // Backoff window only applies once the step has failed.
                let next_retry_at = if current_state.is_error() {
                    step.last_attempted_at.map(|attempted_at| {
                        let computed = backoff.exponential_backoff_seconds(step.attempts);
                        let requested =
                            step.backoff_request_seconds.map(i64::from).unwrap_or(0);
                        attempted_at + Duration::seconds(computed.max(requested))
                    })
                } else {
                    None
                };

                let past_backoff = next_retry_at.map(|at| now >= at).unwrap_or(true);
                let ready_for_execution = dependencies_satisfied
                    && !step.processed
                    && !step.in_process
                    && match current_state {
                        WorkflowStepState::Pending => true,
                        WorkflowStepState::Error => retry_eligible && past_backoff,
                        _ => false,
                    };

                StepReadinessStatus {
                    workflow_step_id: step.workflow_step_id,
                    task_id: step.task_id,
                    name: step.name.clone(),
                    current_state,
                    total_parents,
                    completed_parents,
                    dependencies_satisfied,
                    retry_eligible,
                    ready_for_execution,
                    attempts: step.attempts,
                    retry_limit: step.retry_limit,
                    in_process: step.in_process,
                    processed: step.processed,
                    backoff_request_seconds: step.backoff_request_seconds,
                    last_attempted_at: step.last_attempted_at,
                    next_retry_at,
                }
            })
            .collect()
    }

    /// Load one consistent readiness snapshot for a task from the store
    pub async fn for_task(
        store: &dyn WorkflowStore,
        task_id: i64,
        backoff: &BackoffConfig,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<StepReadinessStatus>> {
        let steps = store.steps_for_task(task_id).await?;
        let edges = store.edges_for_task(task_id).await?;
        let states = store.current_step_states(task_id).await?;
        Ok(Self::compute_for_task(&steps, &edges, &states, backoff, now))
    }

    /// Whether this step has permanently failed (in error with no retry budget)
    pub fn permanently_blocked(&self) -> bool {
        self.current_state.is_error() && !self.retry_eligible
    }

    /// Whether this step has failed but can still retry once its backoff
    /// window closes
    pub fn waiting_for_retry(&self) -> bool {
        self.current_state.is_error() && self.retry_eligible && !self.ready_for_execution
    }

    /// Remaining seconds of this step's explicit requested backoff, if any
    pub fn remaining_requested_backoff(&self, now: DateTime<Utc>) -> Option<i64> {
        let requested = i64::from(self.backoff_request_seconds?);
        let attempted_at = self.last_attempted_at?;
        let remaining = (attempted_at + Duration::seconds(requested) - now).num_seconds();
        (remaining > 0).then_some(remaining)
    }
}

/// Monitoring rollup over a task's readiness snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReadinessSummary {
    pub task_id: i64,
    pub total_steps: usize,
    pub ready_steps: usize,
    pub complete_steps: usize,
    pub blocked_steps: usize,
    pub failed_steps: usize,
    pub progress_percentage: u8,
}

impl TaskReadinessSummary {
    pub fn from_readiness(task_id: i64, readiness: &[StepReadinessStatus]) -> Self {
        let total_steps = readiness.len();
        let ready_steps = readiness.iter().filter(|r| r.ready_for_execution).count();
        let complete_steps = readiness
            .iter()
            .filter(|r| r.current_state.satisfies_dependencies())
            .count();
        let blocked_steps = readiness
            .iter()
            .filter(|r| !r.dependencies_satisfied)
            .count();
        let failed_steps = readiness
            .iter()
            .filter(|r| r.current_state.is_error())
            .count();

        Self {
            task_id,
            total_steps,
            ready_steps,
            complete_steps,
            blocked_steps,
            failed_steps,
            progress_percentage: if total_steps > 0 {
                (complete_steps as f64 / total_steps as f64 * 100.0) as u8
            } else {
                0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewWorkflowStepEdge;

    fn step(id: i64, attempts: i32, retryable: bool) -> WorkflowStep {
        WorkflowStep {
            workflow_step_id: id,
            task_id: 1,
            name: format!("step_{id}"),
            handler_name: "handler".to_string(),
            attempts,
            retry_limit: 3,
            retryable,
            in_process: false,
            processed: false,
            backoff_request_seconds: None,
            last_attempted_at: None,
            timeout_seconds: None,
            inputs: None,
            results: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn edge(from: i64, to: i64) -> WorkflowStepEdge {
        let new_edge = NewWorkflowStepEdge::provides(1, from, to);
        WorkflowStepEdge {
            workflow_step_edge_id: 100 + from,
            task_id: new_edge.task_id,
            from_step_id: new_edge.from_step_id,
            to_step_id: new_edge.to_step_id,
            name: new_edge.name,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn root_step_is_ready_when_pending() {
        let steps = vec![step(1, 0, true)];
        let states = HashMap::from([(1, WorkflowStepState::Pending)]);
        let rows = StepReadinessStatus::compute_for_task(
            &steps,
            &[],
            &states,
            &BackoffConfig::default(),
            Utc::now(),
        );
        assert!(rows[0].dependencies_satisfied);
        assert!(rows[0].ready_for_execution);
    }

    #[test]
    fn child_not_ready_until_parent_completes() {
        let steps = vec![step(1, 0, true), step(2, 0, true)];
        let edges = vec![edge(1, 2)];
        let backoff = BackoffConfig::default();
        let now = Utc::now();

        for parent_state in [
            WorkflowStepState::Pending,
            WorkflowStepState::InProgress,
            WorkflowStepState::Error,
        ] {
            let states =
                HashMap::from([(1, parent_state), (2, WorkflowStepState::Pending)]);
            let rows =
                StepReadinessStatus::compute_for_task(&steps, &edges, &states, &backoff, now);
            let child = rows.iter().find(|r| r.workflow_step_id == 2).unwrap();
            assert!(!child.dependencies_satisfied, "parent {parent_state}");
            assert!(!child.ready_for_execution, "parent {parent_state}");
        }

        let states = HashMap::from([
            (1, WorkflowStepState::Complete),
            (2, WorkflowStepState::Pending),
        ]);
        let rows = StepReadinessStatus::compute_for_task(&steps, &edges, &states, &backoff, now);
        let child = rows.iter().find(|r| r.workflow_step_id == 2).unwrap();
        assert!(child.dependencies_satisfied);
        assert!(child.ready_for_execution);
    }

    #[test]
    fn in_process_and_processed_steps_are_not_ready() {
        let mut claimed = step(1, 0, true);
        claimed.in_process = true;
        let mut done = step(2, 0, true);
        done.processed = true;

        let steps = vec![claimed, done];
        let states = HashMap::from([
            (1, WorkflowStepState::Pending),
            (2, WorkflowStepState::Complete),
        ]);
        let rows = StepReadinessStatus::compute_for_task(
            &steps,
            &[],
            &states,
            &BackoffConfig::default(),
            Utc::now(),
        );
        assert!(rows.iter().all(|r| !r.ready_for_execution));
    }

    #[test]
    fn failed_step_waits_out_backoff_window() {
        let now = Utc::now();
        let mut failed = step(1, 1, true);
        failed.last_attempted_at = Some(now);

        let steps = vec![failed];
        let states = HashMap::from([(1, WorkflowStepState::Error)]);
        let backoff = BackoffConfig::default();

        // attempts = 1 -> exponential backoff of 2s; still inside the window
        let rows = StepReadinessStatus::compute_for_task(&steps, &[], &states, &backoff, now);
        assert!(rows[0].retry_eligible);
        assert!(!rows[0].ready_for_execution);
        assert_eq!(rows[0].next_retry_at, Some(now + Duration::seconds(2)));

        // Past the window the step becomes ready again
        let later = now + Duration::seconds(3);
        let rows = StepReadinessStatus::compute_for_task(&steps, &[], &states, &backoff, later);
        assert!(rows[0].ready_for_execution);
    }

    #[test]
    fn requested_backoff_dominates_computed_backoff() {
        let now = Utc::now();
        let mut failed = step(1, 1, true);
        failed.last_attempted_at = Some(now);
        failed.backoff_request_seconds = Some(120);

        let steps = vec![failed];
        let states = HashMap::from([(1, WorkflowStepState::Error)]);
        let rows = StepReadinessStatus::compute_for_task(
            &steps,
            &[],
            &states,
            &BackoffConfig::default(),
            now,
        );
        // max(120 requested, 2 computed) = 120
        assert_eq!(rows[0].next_retry_at, Some(now + Duration::seconds(120)));
        assert_eq!(rows[0].remaining_requested_backoff(now), Some(120));
    }

    #[test]
    fn exhausted_step_is_never_ready() {
        let now = Utc::now();
        let mut failed = step(1, 3, true);
        failed.last_attempted_at = Some(now - Duration::seconds(3600));

        let steps = vec![failed];
        let states = HashMap::from([(1, WorkflowStepState::Error)]);
        let rows = StepReadinessStatus::compute_for_task(
            &steps,
            &[],
            &states,
            &BackoffConfig::default(),
            now,
        );
        assert!(!rows[0].retry_eligible);
        assert!(!rows[0].ready_for_execution);
        assert!(rows[0].permanently_blocked());
    }

    #[test]
    fn readiness_summary_rollup() {
        let steps = vec![step(1, 0, true), step(2, 0, true), step(3, 0, true)];
        let edges = vec![edge(1, 3), edge(2, 3)];
        let states = HashMap::from([
            (1, WorkflowStepState::Complete),
            (2, WorkflowStepState::Pending),
            (3, WorkflowStepState::Pending),
        ]);
        let rows = StepReadinessStatus::compute_for_task(
            &steps,
            &edges,
            &states,
            &BackoffConfig::default(),
            Utc::now(),
        );
        let summary = TaskReadinessSummary::from_readiness(1, &rows);
        assert_eq!(summary.total_steps, 3);
        assert_eq!(summary.complete_steps, 1);
        assert_eq!(summary.ready_steps, 1); // step 2
        assert_eq!(summary.blocked_steps, 1); // step 3
        assert_eq!(summary.progress_percentage, 33);
    }
}
