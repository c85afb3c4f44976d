//! # Workflow Store
//!
//! Durable storage boundary for tasks, workflow steps, dependency edges,
//! and the append-only transition logs. The orchestration core is written
//! entirely against the [`WorkflowStore`] trait; relational or queue-backed
//! implementations live with the hosting application. [`MemoryStore`] is the
//! in-process reference implementation used by tests and embedded
//! deployments.
//!
//! Contract highlights:
//! - transition appends are atomic and maintain a per-entity monotonic
//!   `sort_key` plus the `most_recent` flag;
//! - `current_step_states` is a set-wise, point-in-time snapshot for one
//!   task, so readiness can be computed in a single pass;
//! - `claim_step` is an atomic test-and-set of the `in_process` guard and is
//!   the mechanism behind at-most-one concurrent execution per step.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

use crate::models::{
    NewStepTransition, NewTask, NewTaskTransition, NewWorkflowStep, NewWorkflowStepEdge,
    StepTransition, Task, TaskTransition, WorkflowStep, WorkflowStepEdge,
};
use crate::state_machine::{TaskState, WorkflowStepState};

/// Storage-level failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    TaskNotFound(i64),

    #[error("workflow step {0} not found")]
    StepNotFound(i64),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Partial update of a workflow step's scalar execution fields.
///
/// `None` leaves a field untouched. `backoff_request_seconds` is doubly
/// optional so a rate-limit hint can be both set and cleared.
#[derive(Debug, Clone, Default)]
pub struct StepExecutionUpdate {
    pub attempts: Option<i32>,
    pub in_process: Option<bool>,
    pub processed: Option<bool>,
    pub retryable: Option<bool>,
    pub backoff_request_seconds: Option<Option<i32>>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub results: Option<Value>,
}

impl StepExecutionUpdate {
    pub fn set_in_process(mut self, in_process: bool) -> Self {
        self.in_process = Some(in_process);
        self
    }

    pub fn set_processed(mut self, processed: bool) -> Self {
        self.processed = Some(processed);
        self
    }

    pub fn set_attempts(mut self, attempts: i32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn set_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn set_backoff_request_seconds(mut self, seconds: Option<i32>) -> Self {
        self.backoff_request_seconds = Some(seconds);
        self
    }

    pub fn set_last_attempted_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_attempted_at = Some(at);
        self
    }

    pub fn set_results(mut self, results: Value) -> Self {
        self.results = Some(results);
        self
    }
}

/// Durable storage for the orchestration core
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // Tasks
    async fn create_task(&self, new_task: NewTask) -> StoreResult<Task>;
    async fn task(&self, task_id: i64) -> StoreResult<Option<Task>>;
    async fn set_task_complete(&self, task_id: i64, complete: bool) -> StoreResult<()>;

    // Steps and edges
    async fn create_step(&self, new_step: NewWorkflowStep) -> StoreResult<WorkflowStep>;
    async fn step(&self, step_id: i64) -> StoreResult<Option<WorkflowStep>>;
    async fn steps_for_task(&self, task_id: i64) -> StoreResult<Vec<WorkflowStep>>;
    async fn create_edge(&self, new_edge: NewWorkflowStepEdge) -> StoreResult<WorkflowStepEdge>;
    async fn edges_for_task(&self, task_id: i64) -> StoreResult<Vec<WorkflowStepEdge>>;

    /// Apply a partial scalar update and return the updated step
    async fn update_step_execution(
        &self,
        step_id: i64,
        update: StepExecutionUpdate,
    ) -> StoreResult<WorkflowStep>;

    /// Atomically set `in_process = true` iff the step is currently neither
    /// in process nor processed. Returns whether the claim succeeded.
    async fn claim_step(&self, step_id: i64) -> StoreResult<bool>;

    // Transition logs
    async fn append_task_transition(
        &self,
        transition: NewTaskTransition,
    ) -> StoreResult<TaskTransition>;
    async fn append_step_transition(
        &self,
        transition: NewStepTransition,
    ) -> StoreResult<StepTransition>;
    async fn task_transitions(&self, task_id: i64) -> StoreResult<Vec<TaskTransition>>;
    async fn step_transitions(&self, step_id: i64) -> StoreResult<Vec<StepTransition>>;

    /// Current state of one task; `None` means no transitions yet (default state)
    async fn current_task_state(&self, task_id: i64) -> StoreResult<Option<TaskState>>;
    /// Current state of one step; `None` means no transitions yet (default state)
    async fn current_step_state(&self, step_id: i64) -> StoreResult<Option<WorkflowStepState>>;
    /// Set-wise current-state snapshot for every step of a task
    async fn current_step_states(
        &self,
        task_id: i64,
    ) -> StoreResult<HashMap<i64, WorkflowStepState>>;
}
