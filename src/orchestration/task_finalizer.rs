//! # Task Finalizer
//!
//! Invoked after every discovery+execution pass, whether or not any steps
//! executed. Reads a fresh execution context and applies the decision
//! table:
//!
//! | execution_status           | action                              |
//! |----------------------------|-------------------------------------|
//! | `all_complete`             | transition task → complete          |
//! | `has_ready_steps`          | reenqueue, no delay                 |
//! | `waiting_for_dependencies` | reenqueue with computed delay       |
//! | `processing`               | reenqueue, short probe delay        |
//! | `blocked_by_failures`      | transition task → error             |
//!
//! The crux of correct retry semantics: a step with a retryable failure and
//! remaining attempts keeps the task reenqueued, never errored.
//! `waiting_for_dependencies` and `blocked_by_failures` are distinguished
//! by the readiness computation, not by "any step failed".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::BackoffConfig;
use crate::constants::{events, ExecutionStatus, ReenqueueReason};
use crate::events::{EventPublisher, PublishError};
use crate::models::{StepReadinessStatus, Task, TaskExecutionContext};
use crate::state_machine::{
    StateMachineError, TaskEvent, TaskState, TaskStateMachine, TransitionOutcome,
};
use crate::store::{StoreError, WorkflowStore};

use super::task_reenqueuer::{
    ReenqueueError, ReenqueuePriority, ReenqueueRequest, TaskReenqueuer,
};

/// Action the finalizer took for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizationAction {
    /// Task transitioned to complete
    Completed,
    /// Task transitioned to error
    Failed,
    /// Task scheduled for another pass
    Reenqueued,
    /// Nothing to do (already terminal, or transition rejected)
    NoAction,
}

/// Result of one finalization decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationResult {
    pub task_id: i64,
    pub action: FinalizationAction,
    pub execution_status: ExecutionStatus,
    pub completion_percentage: f64,
    pub total_steps: usize,
    /// Reenqueue delay when `action == Reenqueued`
    pub delay_seconds: Option<u64>,
    pub reason: Option<String>,
}

/// Finalization failures
#[derive(Debug, thiserror::Error)]
pub enum FinalizationError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("task {0} not found")]
    TaskNotFound(i64),

    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("reenqueue failure: {0}")]
    Reenqueue(#[from] ReenqueueError),

    #[error("event publishing error: {0}")]
    Event(#[from] PublishError),
}

/// Computes reenqueue delays.
///
/// When the task is waiting and a not-yet-retryable step carries an
/// explicit `backoff_request_seconds`, the delay is the maximum remaining
/// backoff across all such steps plus a fixed safety buffer; the task
/// cannot proceed faster than its slowest-blocked step. Otherwise a fixed
/// delay keyed by execution status applies. Every delay is capped.
#[derive(Debug, Clone)]
pub struct DelayCalculator {
    config: BackoffConfig,
}

impl DelayCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn reenqueue_delay(
        &self,
        status: ExecutionStatus,
        readiness: &[StepReadinessStatus],
        now: DateTime<Utc>,
    ) -> u64 {
        let delay = match status {
            ExecutionStatus::WaitingForDependencies => self
                .max_remaining_requested_backoff(readiness, now)
                .map(|remaining| remaining as u64 + self.config.buffer_seconds)
                .unwrap_or(self.config.reenqueue_delays.waiting_for_dependencies),
            ExecutionStatus::HasReadySteps => self.config.reenqueue_delays.has_ready_steps,
            ExecutionStatus::Processing => self.config.reenqueue_delays.processing,
            ExecutionStatus::AllComplete | ExecutionStatus::BlockedByFailures => {
                self.config.default_reenqueue_delay
            }
        };
        delay.min(self.config.max_reenqueue_delay)
    }

    fn max_remaining_requested_backoff(
        &self,
        readiness: &[StepReadinessStatus],
        now: DateTime<Utc>,
    ) -> Option<i64> {
        readiness
            .iter()
            .filter(|row| !row.ready_for_execution)
            .filter_map(|row| row.remaining_requested_backoff(now))
            .max()
    }
}

/// Applies the finalization decision table after each pass
pub struct TaskFinalizer {
    store: Arc<dyn WorkflowStore>,
    publisher: EventPublisher,
    reenqueuer: TaskReenqueuer,
    delay_calculator: DelayCalculator,
    backoff: BackoffConfig,
}

impl TaskFinalizer {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        publisher: EventPublisher,
        reenqueuer: TaskReenqueuer,
        backoff: BackoffConfig,
    ) -> Self {
        let delay_calculator = DelayCalculator::new(backoff.clone());
        Self {
            store,
            publisher,
            reenqueuer,
            delay_calculator,
            backoff,
        }
    }

    /// Whether the task is blocked by permanent failures
    pub async fn blocked_by_errors(&self, task_id: i64) -> Result<bool, FinalizationError> {
        let context =
            TaskExecutionContext::for_task(self.store.as_ref(), task_id, &self.backoff, Utc::now())
                .await?;
        Ok(context.execution_status == ExecutionStatus::BlockedByFailures)
    }

    /// Convenience entry point for event-driven flows when discovery found
    /// nothing to execute.
    pub async fn handle_no_viable_steps(
        &self,
        task_id: i64,
    ) -> Result<FinalizationResult, FinalizationError> {
        self.finalize_task(task_id).await
    }

    /// Decide and apply the next action for a task
    #[instrument(skip(self), fields(task_id = task_id))]
    pub async fn finalize_task(&self, task_id: i64) -> Result<FinalizationResult, FinalizationError> {
        let task = self
            .store
            .task(task_id)
            .await?
            .ok_or(FinalizationError::TaskNotFound(task_id))?;

        let now = Utc::now();
        let readiness =
            StepReadinessStatus::for_task(self.store.as_ref(), task_id, &self.backoff, now).await?;
        let context = TaskExecutionContext::from_readiness(task_id, &readiness);

        self.publisher
            .publish(
                events::FINALIZATION_STARTED,
                json!({
                    "task_id": task_id,
                    "execution_status": context.execution_status,
                    "ready_steps": context.ready_steps,
                    "failed_steps": context.failed_steps,
                }),
            )
            .await?;

        debug!(
            task_id,
            execution_status = %context.execution_status,
            ready_steps = context.ready_steps,
            in_progress_steps = context.in_progress_steps,
            failed_steps = context.failed_steps,
            "Making finalization decision"
        );

        let result = match context.execution_status {
            ExecutionStatus::AllComplete => self.complete_task(&task, &context).await?,
            ExecutionStatus::BlockedByFailures => self.error_task(&task, &context).await?,
            ExecutionStatus::HasReadySteps => {
                self.reenqueue_task(
                    &task,
                    &context,
                    &readiness,
                    now,
                    ReenqueueReason::ReadyStepsAvailable,
                    ReenqueuePriority::High,
                )
                .await?
            }
            ExecutionStatus::WaitingForDependencies => {
                let reason = if readiness.iter().any(|r| r.waiting_for_retry()) {
                    ReenqueueReason::RetryBackoff
                } else {
                    ReenqueueReason::AwaitingDependencies
                };
                self.reenqueue_task(
                    &task,
                    &context,
                    &readiness,
                    now,
                    reason,
                    ReenqueuePriority::Low,
                )
                .await?
            }
            ExecutionStatus::Processing => {
                self.reenqueue_task(
                    &task,
                    &context,
                    &readiness,
                    now,
                    ReenqueueReason::StepsInProgress,
                    ReenqueuePriority::Normal,
                )
                .await?
            }
        };

        self.publisher
            .publish(
                events::FINALIZATION_COMPLETED,
                json!({
                    "task_id": task_id,
                    "action": result.action,
                    "execution_status": result.execution_status,
                    "delay_seconds": result.delay_seconds,
                }),
            )
            .await?;

        Ok(result)
    }

    async fn complete_task(
        &self,
        task: &Task,
        context: &TaskExecutionContext,
    ) -> Result<FinalizationResult, FinalizationError> {
        let mut machine =
            TaskStateMachine::new(task.clone(), self.store.clone(), self.publisher.clone());

        if machine.current_state().await? == TaskState::Complete {
            return Ok(self.result(task.task_id, FinalizationAction::Completed, context, None, None));
        }

        match machine.safe_transition(TaskEvent::Complete).await? {
            TransitionOutcome::Applied(_) => {
                self.store.set_task_complete(task.task_id, true).await?;
                self.publisher
                    .publish(
                        events::TASK_COMPLETED,
                        json!({
                            "task_id": task.task_id,
                            "task_uuid": task.task_uuid,
                            "total_steps": context.total_steps,
                        }),
                    )
                    .await?;
                info!(task_id = task.task_id, "Task completed");
                Ok(self.result(task.task_id, FinalizationAction::Completed, context, None, None))
            }
            TransitionOutcome::Rejected { current, reason } => {
                warn!(
                    task_id = task.task_id,
                    current_state = %current,
                    reason = %reason,
                    "Complete transition rejected"
                );
                Ok(self.result(
                    task.task_id,
                    FinalizationAction::NoAction,
                    context,
                    None,
                    Some(reason),
                ))
            }
        }
    }

    async fn error_task(
        &self,
        task: &Task,
        context: &TaskExecutionContext,
    ) -> Result<FinalizationResult, FinalizationError> {
        let mut machine =
            TaskStateMachine::new(task.clone(), self.store.clone(), self.publisher.clone());
        let message = format!(
            "{} step(s) permanently failed with no path forward",
            context.failed_steps
        );

        match machine
            .safe_transition(TaskEvent::fail_with_error(message.clone()))
            .await?
        {
            TransitionOutcome::Applied(_) => {
                self.publisher
                    .publish(
                        events::TASK_FAILED,
                        json!({
                            "task_id": task.task_id,
                            "task_uuid": task.task_uuid,
                            "failed_steps": context.failed_steps,
                            "reason": message,
                        }),
                    )
                    .await?;
                warn!(task_id = task.task_id, failed_steps = context.failed_steps, "Task failed");
                Ok(self.result(
                    task.task_id,
                    FinalizationAction::Failed,
                    context,
                    None,
                    Some(message),
                ))
            }
            TransitionOutcome::Rejected { current, reason } => {
                warn!(
                    task_id = task.task_id,
                    current_state = %current,
                    reason = %reason,
                    "Fail transition rejected"
                );
                Ok(self.result(
                    task.task_id,
                    FinalizationAction::NoAction,
                    context,
                    None,
                    Some(reason),
                ))
            }
        }
    }

    async fn reenqueue_task(
        &self,
        task: &Task,
        context: &TaskExecutionContext,
        readiness: &[StepReadinessStatus],
        now: DateTime<Utc>,
        reason: ReenqueueReason,
        priority: ReenqueuePriority,
    ) -> Result<FinalizationResult, FinalizationError> {
        let delay_seconds =
            self.delay_calculator
                .reenqueue_delay(context.execution_status, readiness, now);

        let request = ReenqueueRequest::new(reason)
            .with_delay(Duration::from_secs(delay_seconds))
            .with_priority(priority)
            .with_metadata("ready_steps", json!(context.ready_steps))
            .with_metadata("execution_status", json!(context.execution_status));

        self.reenqueuer.reenqueue(task, request).await?;

        Ok(self.result(
            task.task_id,
            FinalizationAction::Reenqueued,
            context,
            Some(delay_seconds),
            Some(reason.to_string()),
        ))
    }

    fn result(
        &self,
        task_id: i64,
        action: FinalizationAction,
        context: &TaskExecutionContext,
        delay_seconds: Option<u64>,
        reason: Option<String>,
    ) -> FinalizationResult {
        FinalizationResult {
            task_id,
            action,
            execution_status: context.execution_status,
            completion_percentage: context.completion_percentage,
            total_steps: context.total_steps,
            delay_seconds,
            reason,
        }
    }
}
