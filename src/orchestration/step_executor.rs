//! # Step Executor
//!
//! Executes a batch of viable steps, sequentially or on a bounded worker
//! pool, and drives each step's state machine from the outcome.
//!
//! Per-step protocol:
//! 1. atomically claim the step (`in_process = true`), the guard against
//!    duplicate concurrent execution;
//! 2. transition the step state machine to `in_progress`, then invoke the
//!    bound handler explicitly, so execution triggering is visible here and
//!    not hidden in a state machine callback;
//! 3. on success: transition to `complete`, set `processed`, clear
//!    `in_process`, store results;
//! 4. on failure or timeout: clear `in_process`, increment `attempts`,
//!    apply the failure's backoff classification, transition to `error`.
//!
//! One step's failure, timeout, or panic never aborts its siblings;
//! retry-worthiness is decided by the next readiness computation, not here.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ExecutionConfig;
use crate::events::{EventPublisher, PublishError};
use crate::handler::{StepContext, StepHandlerError};
use crate::models::{Task, WorkflowStep};
use crate::registry::StepHandlerRegistry;
use crate::state_machine::{StateMachineError, StepEvent, StepStateMachine};
use crate::store::{StepExecutionUpdate, StoreError, WorkflowStore};

use super::backoff_calculator::{BackoffCalculator, BackoffError};
use super::types::{DiscoveredSteps, ProcessingMode, StepExecutionOutcome, ViableStep};

/// Infrastructure-level execution failures. Handler failures are not errors
/// here; they surface as `Failed` outcomes.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("event publishing error: {0}")]
    Event(#[from] PublishError),

    #[error("backoff error: {0}")]
    Backoff(#[from] BackoffError),

    #[error("workflow step {step_id} not found")]
    StepNotFound { step_id: i64 },

    #[error("task {task_id} not found")]
    TaskNotFound { task_id: i64 },

    #[error("concurrency failure: {reason}")]
    Concurrency { reason: String },
}

/// Batch step executor
#[derive(Clone)]
pub struct StepExecutor {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<StepHandlerRegistry>,
    publisher: EventPublisher,
    backoff: BackoffCalculator,
    config: ExecutionConfig,
}

impl StepExecutor {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        registry: Arc<StepHandlerRegistry>,
        publisher: EventPublisher,
        backoff: BackoffCalculator,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            store,
            registry,
            publisher,
            backoff,
            config,
        }
    }

    /// Execute every step in the batch under the discovered processing mode
    #[instrument(skip(self, discovered), fields(task_id = discovered.task_id, step_count = discovered.len()))]
    pub async fn execute_batch(
        &self,
        discovered: &DiscoveredSteps,
    ) -> Result<Vec<StepExecutionOutcome>, ExecutionError> {
        if discovered.is_empty() {
            return Ok(Vec::new());
        }

        let outcomes = match discovered.processing_mode {
            ProcessingMode::Sequential => self.execute_sequential(&discovered.steps).await,
            ProcessingMode::Concurrent => self.execute_concurrent(&discovered.steps).await?,
        };

        info!(
            task_id = discovered.task_id,
            executed = outcomes.len(),
            succeeded = outcomes.iter().filter(|o| o.is_success()).count(),
            failed = outcomes.iter().filter(|o| o.is_failure()).count(),
            "Batch execution completed"
        );

        Ok(outcomes)
    }

    /// One step at a time, in discovery order. A failure in one step does
    /// not prevent attempting the remaining steps in the same pass.
    async fn execute_sequential(&self, steps: &[ViableStep]) -> Vec<StepExecutionOutcome> {
        let mut outcomes = Vec::with_capacity(steps.len());
        for step in steps {
            outcomes.push(self.execute_or_record(step).await);
        }
        outcomes
    }

    /// Bounded worker pool: concurrency width derived from shared-resource
    /// headroom, each step under its own timeout. A panic or infrastructure
    /// error in one step's future does not cancel its siblings.
    async fn execute_concurrent(
        &self,
        steps: &[ViableStep],
    ) -> Result<Vec<StepExecutionOutcome>, ExecutionError> {
        let width = self.config.effective_concurrency();
        debug!(width, steps = steps.len(), "Starting concurrent batch");
        let semaphore = Arc::new(Semaphore::new(width));

        let mut handles = Vec::with_capacity(steps.len());
        for step in steps {
            let executor = self.clone();
            let semaphore = semaphore.clone();
            let step = step.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| {
                    ExecutionError::Concurrency {
                        reason: e.to_string(),
                    }
                })?;
                Ok::<_, ExecutionError>(executor.execute_or_record(&step).await)
            }));
        }

        let joined = futures::future::join_all(handles).await;
        let mut outcomes = Vec::with_capacity(steps.len());
        for (step, result) in steps.iter().zip(joined) {
            let outcome = match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    error!(step_id = step.step_id, error = %e, "Step execution infrastructure failure");
                    StepExecutionOutcome::failed(
                        step.step_id,
                        step.task_id,
                        step.name.clone(),
                        e.to_string(),
                        Duration::default(),
                    )
                }
                Err(join_error) => {
                    error!(step_id = step.step_id, error = %join_error, "Step execution task panicked");
                    StepExecutionOutcome::failed(
                        step.step_id,
                        step.task_id,
                        step.name.clone(),
                        format!("execution task panicked: {join_error}"),
                        Duration::default(),
                    )
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Execute one step, converting infrastructure errors into failed
    /// outcomes so siblings in the same pass are unaffected.
    async fn execute_or_record(&self, viable: &ViableStep) -> StepExecutionOutcome {
        match self.execute_step(viable).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    task_id = viable.task_id,
                    step_id = viable.step_id,
                    error = %e,
                    "Step execution failed on infrastructure error"
                );
                StepExecutionOutcome::failed(
                    viable.step_id,
                    viable.task_id,
                    viable.name.clone(),
                    e.to_string(),
                    Duration::default(),
                )
            }
        }
    }

    /// Execute a single viable step through the full per-step protocol
    #[instrument(skip(self, viable), fields(task_id = viable.task_id, step_id = viable.step_id))]
    pub async fn execute_step(
        &self,
        viable: &ViableStep,
    ) -> Result<StepExecutionOutcome, ExecutionError> {
        let started = Instant::now();

        // The in_process claim excludes this step from any concurrent pass's
        // viable set and from double execution within this pass.
        if !self.store.claim_step(viable.step_id).await? {
            debug!(
                step_id = viable.step_id,
                "Step already claimed or processed, skipping"
            );
            return Ok(StepExecutionOutcome::skipped(
                viable.step_id,
                viable.task_id,
                viable.name.clone(),
                "step already in process or processed",
            ));
        }

        match self.execute_claimed(viable, started).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Release the claim so the next readiness pass can recover.
                if let Err(release_error) = self
                    .store
                    .update_step_execution(
                        viable.step_id,
                        StepExecutionUpdate::default().set_in_process(false),
                    )
                    .await
                {
                    warn!(
                        step_id = viable.step_id,
                        error = %release_error,
                        "Failed to release step claim after execution error"
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute_claimed(
        &self,
        viable: &ViableStep,
        started: Instant,
    ) -> Result<StepExecutionOutcome, ExecutionError> {
        let step = self
            .store
            .step(viable.step_id)
            .await?
            .ok_or(ExecutionError::StepNotFound {
                step_id: viable.step_id,
            })?;
        let task = self
            .store
            .task(step.task_id)
            .await?
            .ok_or(ExecutionError::TaskNotFound {
                task_id: step.task_id,
            })?;

        let mut machine =
            StepStateMachine::new(step.clone(), self.store.clone(), self.publisher.clone());

        // The in_progress transition gates on dependency and retry guards;
        // a rejection means another pass got here first or state moved.
        let transition = machine.safe_transition(StepEvent::Start).await?;
        if !transition.was_applied() {
            self.store
                .update_step_execution(
                    step.workflow_step_id,
                    StepExecutionUpdate::default().set_in_process(false),
                )
                .await?;
            return Ok(StepExecutionOutcome::skipped(
                step.workflow_step_id,
                step.task_id,
                step.name.clone(),
                "start transition rejected",
            ));
        }

        let step = self
            .store
            .update_step_execution(
                step.workflow_step_id,
                StepExecutionUpdate::default().set_last_attempted_at(Utc::now()),
            )
            .await?;

        self.publisher
            .publish_step_execution_started(step.task_id, step.workflow_step_id, &step.name)
            .await?;

        let handler = match self.registry.resolve_handler(&step.handler_name) {
            Ok(handler) => handler,
            Err(e) => {
                // A missing handler binding can never succeed on retry.
                return self
                    .record_failure(
                        machine,
                        step,
                        StepHandlerError::permanent(e.to_string()),
                        started,
                    )
                    .await;
            }
        };

        let context = self.build_step_context(&task, &step).await?;
        let step_timeout = step
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.step_execution_timeout());

        let handler_result = timeout(step_timeout, async {
            let output = handler.process(&context).await?;
            handler.process_results(&context, &output).await
        })
        .await;

        match handler_result {
            Ok(Ok(results)) => self.record_success(machine, step, results, started).await,
            Ok(Err(failure)) => self.record_failure(machine, step, failure, started).await,
            Err(_) => {
                let failure = StepHandlerError::retryable(format!(
                    "step execution timed out after {}s",
                    step_timeout.as_secs()
                ));
                self.record_failure(machine, step, failure, started).await
            }
        }
    }

    async fn record_success(
        &self,
        mut machine: StepStateMachine,
        step: WorkflowStep,
        results: serde_json::Value,
        started: Instant,
    ) -> Result<StepExecutionOutcome, ExecutionError> {
        let transition = machine
            .safe_transition(StepEvent::complete_with_results(results.clone()))
            .await?;
        if !transition.was_applied() {
            warn!(
                step_id = step.workflow_step_id,
                "Complete transition rejected after successful handler run"
            );
        }

        self.store
            .update_step_execution(
                step.workflow_step_id,
                StepExecutionUpdate::default()
                    .set_processed(true)
                    .set_in_process(false)
                    .set_backoff_request_seconds(None)
                    .set_results(results.clone()),
            )
            .await?;

        let duration = started.elapsed();
        self.publisher
            .publish_step_execution_completed(
                step.task_id,
                step.workflow_step_id,
                &step.name,
                duration.as_millis(),
            )
            .await?;

        debug!(
            task_id = step.task_id,
            step_id = step.workflow_step_id,
            duration_ms = duration.as_millis() as u64,
            "Step execution succeeded"
        );

        Ok(StepExecutionOutcome::completed(
            step.workflow_step_id,
            step.task_id,
            step.name,
            results,
            duration,
        ))
    }

    async fn record_failure(
        &self,
        mut machine: StepStateMachine,
        step: WorkflowStep,
        failure: StepHandlerError,
        started: Instant,
    ) -> Result<StepExecutionOutcome, ExecutionError> {
        let attempts = step.attempts + 1;
        let mut update = StepExecutionUpdate::default()
            .set_attempts(attempts)
            .set_in_process(false);
        if failure.is_permanent() {
            update = update.set_retryable(false);
        }
        let updated = self
            .store
            .update_step_execution(step.workflow_step_id, update)
            .await?;

        self.backoff
            .apply_failure_backoff(&updated, &failure, Utc::now())
            .await?;

        let message = failure.to_string();
        machine
            .safe_transition(StepEvent::fail_with_error(message.clone()))
            .await?;

        self.publisher
            .publish_step_execution_failed(
                step.task_id,
                step.workflow_step_id,
                &step.name,
                &message,
                attempts,
            )
            .await?;

        warn!(
            task_id = step.task_id,
            step_id = step.workflow_step_id,
            attempts,
            retry_limit = step.retry_limit,
            error = %message,
            "Step execution failed"
        );

        Ok(StepExecutionOutcome::failed(
            step.workflow_step_id,
            step.task_id,
            step.name,
            message,
            started.elapsed(),
        ))
    }

    /// Assemble the handler-visible context: task input plus the results of
    /// this step's parents, keyed by parent step name.
    async fn build_step_context(
        &self,
        task: &Task,
        step: &WorkflowStep,
    ) -> Result<StepContext, ExecutionError> {
        let edges = self.store.edges_for_task(task.task_id).await?;
        let steps = self.store.steps_for_task(task.task_id).await?;

        let mut previous_results = std::collections::HashMap::new();
        for edge in edges
            .iter()
            .filter(|e| e.to_step_id == step.workflow_step_id)
        {
            if let Some(parent) = steps
                .iter()
                .find(|s| s.workflow_step_id == edge.from_step_id)
            {
                previous_results.insert(
                    parent.name.clone(),
                    parent.results.clone().unwrap_or(serde_json::json!({})),
                );
            }
        }

        Ok(StepContext {
            task: task.clone(),
            step: step.clone(),
            task_context: task.context.clone().unwrap_or(serde_json::json!({})),
            previous_results,
            attempt: step.attempts + 1,
        })
    }
}
