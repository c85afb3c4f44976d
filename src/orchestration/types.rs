//! Core types shared across the orchestration components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::models::StepReadinessStatus;
use crate::state_machine::WorkflowStepState;

/// How a discovered batch of steps should be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// One step at a time, in discovery order
    Sequential,
    /// Bounded worker pool, each step with its own timeout
    Concurrent,
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Concurrent => f.write_str("concurrent"),
        }
    }
}

/// A step whose dependencies are satisfied and which is eligible to execute now
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViableStep {
    pub step_id: i64,
    pub task_id: i64,
    pub name: String,
    pub current_state: WorkflowStepState,
    pub dependencies_satisfied: bool,
    pub retry_eligible: bool,
    pub attempts: i32,
    pub retry_limit: i32,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl From<&StepReadinessStatus> for ViableStep {
    fn from(status: &StepReadinessStatus) -> Self {
        Self {
            step_id: status.workflow_step_id,
            task_id: status.task_id,
            name: status.name.clone(),
            current_state: status.current_state,
            dependencies_satisfied: status.dependencies_satisfied,
            retry_eligible: status.retry_eligible,
            attempts: status.attempts,
            retry_limit: status.retry_limit,
            last_attempted_at: status.last_attempted_at,
            next_retry_at: status.next_retry_at,
        }
    }
}

/// The executable frontier for one processing pass
#[derive(Debug, Clone)]
pub struct DiscoveredSteps {
    pub task_id: i64,
    pub steps: Vec<ViableStep>,
    pub processing_mode: ProcessingMode,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredSteps {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

/// Final status of one step execution attempt within a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcomeStatus {
    /// Handler succeeded; the step is complete and processed
    Completed,
    /// Handler failed or timed out; the step is in error
    Failed,
    /// The step was not executed (claim lost or transition rejected)
    Skipped,
}

/// Result of one step execution attempt
#[derive(Debug, Clone)]
pub struct StepExecutionOutcome {
    pub step_id: i64,
    pub task_id: i64,
    pub step_name: String,
    pub status: StepOutcomeStatus,
    pub results: Option<Value>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl StepExecutionOutcome {
    pub fn completed(
        step_id: i64,
        task_id: i64,
        step_name: impl Into<String>,
        results: Value,
        duration: Duration,
    ) -> Self {
        Self {
            step_id,
            task_id,
            step_name: step_name.into(),
            status: StepOutcomeStatus::Completed,
            results: Some(results),
            error: None,
            duration,
        }
    }

    pub fn failed(
        step_id: i64,
        task_id: i64,
        step_name: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            step_id,
            task_id,
            step_name: step_name.into(),
            status: StepOutcomeStatus::Failed,
            results: None,
            error: Some(error.into()),
            duration,
        }
    }

    pub fn skipped(
        step_id: i64,
        task_id: i64,
        step_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            step_id,
            task_id,
            step_name: step_name.into(),
            status: StepOutcomeStatus::Skipped,
            results: None,
            error: Some(reason.into()),
            duration: Duration::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepOutcomeStatus::Completed
    }

    pub fn is_failure(&self) -> bool {
        self.status == StepOutcomeStatus::Failed
    }
}
