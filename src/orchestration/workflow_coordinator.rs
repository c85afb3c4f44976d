//! # Workflow Coordinator
//!
//! Wires one full processing pass: discovery → execution → finalization.
//! The coordinator is not a loop; each invocation is exactly one pass, and
//! continuation across passes happens through the reenqueue path. That
//! keeps "one step of orchestration logic" decoupled from "how passes are
//! scheduled": production drives passes from a [`PassScheduler`] worker
//! loop, test harnesses call `run_pass` directly.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::EventPublisher;
use crate::registry::StepHandlerRegistry;
use crate::state_machine::{TaskEvent, TaskStateMachine};
use crate::store::WorkflowStore;

use super::backoff_calculator::BackoffCalculator;
use super::step_executor::StepExecutor;
use super::task_finalizer::{FinalizationAction, FinalizationResult, TaskFinalizer};
use super::task_reenqueuer::{PassScheduler, TaskReenqueuer};
use super::types::{ProcessingMode, StepExecutionOutcome};
use super::viable_step_discovery::ViableStepDiscovery;

/// Result of one processing pass
#[derive(Debug)]
pub struct PassOutcome {
    pub task_id: i64,
    pub steps_discovered: usize,
    pub processing_mode: ProcessingMode,
    pub outcomes: Vec<StepExecutionOutcome>,
    pub finalization: FinalizationResult,
}

impl PassOutcome {
    /// Whether the task reached a terminal state in this pass
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.finalization.action,
            FinalizationAction::Completed | FinalizationAction::Failed
        )
    }
}

/// One-pass orchestration engine
pub struct WorkflowCoordinator {
    store: Arc<dyn WorkflowStore>,
    publisher: EventPublisher,
    discovery: ViableStepDiscovery,
    executor: StepExecutor,
    finalizer: TaskFinalizer,
}

impl WorkflowCoordinator {
    /// Wire a coordinator from its collaborators. The scheduler is the
    /// injection seam: production passes a queue-backed implementation,
    /// tests pass an inline recording one.
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        registry: Arc<StepHandlerRegistry>,
        publisher: EventPublisher,
        scheduler: Arc<dyn PassScheduler>,
        config: EngineConfig,
    ) -> Self {
        let discovery = ViableStepDiscovery::new(
            store.clone(),
            publisher.clone(),
            config.execution.clone(),
            config.backoff.clone(),
        );
        let backoff_calculator =
            BackoffCalculator::new(store.clone(), publisher.clone(), config.backoff.clone());
        let executor = StepExecutor::new(
            store.clone(),
            registry,
            publisher.clone(),
            backoff_calculator,
            config.execution.clone(),
        );
        let reenqueuer = TaskReenqueuer::new(store.clone(), publisher.clone(), scheduler);
        let finalizer = TaskFinalizer::new(
            store.clone(),
            publisher.clone(),
            reenqueuer,
            config.backoff.clone(),
        );

        Self {
            store,
            publisher,
            discovery,
            executor,
            finalizer,
        }
    }

    /// Run one processing pass for a task: discover the viable frontier,
    /// execute it, then let the finalizer decide what happens next.
    #[instrument(skip(self), fields(task_id = task_id))]
    pub async fn run_pass(&self, task_id: i64) -> Result<PassOutcome> {
        debug!(task_id, "Starting processing pass");

        self.ensure_task_started(task_id).await?;

        let discovered = self.discovery.discover_steps_for_task(task_id).await?;
        let steps_discovered = discovered.len();
        let processing_mode = discovered.processing_mode;

        let outcomes = self.executor.execute_batch(&discovered).await?;

        let finalization = self.finalizer.finalize_task(task_id).await?;

        info!(
            task_id,
            steps_discovered,
            steps_executed = outcomes.len(),
            action = ?finalization.action,
            "Processing pass finished"
        );

        Ok(PassOutcome {
            task_id,
            steps_discovered,
            processing_mode,
            outcomes,
            finalization,
        })
    }

    /// Move a pending task into `in_progress` at the start of a pass; a
    /// rejection (already in progress, terminal) is a normal no-op.
    async fn ensure_task_started(&self, task_id: i64) -> Result<()> {
        let task = self
            .store
            .task(task_id)
            .await?
            .ok_or(crate::store::StoreError::TaskNotFound(task_id))?;
        let mut machine = TaskStateMachine::new(task, self.store.clone(), self.publisher.clone());
        machine.safe_transition(TaskEvent::Start).await?;
        Ok(())
    }

    /// Read-only access to the finalizer (for host wiring and diagnostics)
    pub fn finalizer(&self) -> &TaskFinalizer {
        &self.finalizer
    }

    /// Read-only access to discovery (for host wiring and diagnostics)
    pub fn discovery(&self) -> &ViableStepDiscovery {
        &self.discovery
    }
}
