use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node in a task's DAG.
///
/// Status is derived from the step transition log. The scalar execution
/// fields here (`attempts`, `in_process`, `processed`,
/// `backoff_request_seconds`, `last_attempted_at`, `results`) are mutated
/// through [`StepExecutionUpdate`](crate::store::StepExecutionUpdate) only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Store-assigned row id
    pub workflow_step_id: i64,
    pub task_id: i64,
    pub name: String,
    /// Registry key of the handler bound to this step
    pub handler_name: String,
    /// Number of completed execution attempts
    pub attempts: i32,
    pub retry_limit: i32,
    pub retryable: bool,
    /// Execution-in-flight guard; set atomically when a pass claims the step
    pub in_process: bool,
    /// Terminal-success guard; a processed step is never executed again
    pub processed: bool,
    /// Explicit requested delay (e.g. from a rate-limit response), seconds
    pub backoff_request_seconds: Option<i32>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// Per-step handler timeout override, seconds
    pub timeout_seconds: Option<u64>,
    /// Static inputs from the step template
    pub inputs: Option<Value>,
    /// Opaque structured handler output
    pub results: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowStep {
    /// Check retry eligibility from the scalar fields alone. The full
    /// readiness decision additionally needs state and backoff timing.
    pub fn retry_eligible(&self) -> bool {
        self.retryable && self.attempts < self.retry_limit
    }

    /// Check if the retry budget is exhausted
    pub fn retries_exhausted(&self) -> bool {
        !self.retryable || self.attempts >= self.retry_limit
    }
}

/// Insertable workflow step data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflowStep {
    pub task_id: i64,
    pub name: String,
    pub handler_name: String,
    pub retry_limit: i32,
    pub retryable: bool,
    pub timeout_seconds: Option<u64>,
    pub inputs: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(attempts: i32, retry_limit: i32, retryable: bool) -> WorkflowStep {
        WorkflowStep {
            workflow_step_id: 1,
            task_id: 1,
            name: "fetch".to_string(),
            handler_name: "fetch_handler".to_string(),
            attempts,
            retry_limit,
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

    #[test]
    fn retry_eligibility() {
        assert!(step(0, 3, true).retry_eligible());
        assert!(step(2, 3, true).retry_eligible());
        assert!(!step(3, 3, true).retry_eligible());
        assert!(!step(0, 3, false).retry_eligible());
    }

    #[test]
    fn exhaustion() {
        assert!(step(3, 3, true).retries_exhausted());
        assert!(step(0, 3, false).retries_exhausted());
        assert!(!step(1, 3, true).retries_exhausted());
    }
}
