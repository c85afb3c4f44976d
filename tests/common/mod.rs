//! Shared fixtures for integration tests: a wired engine over the in-memory
//! store plus a set of scripted step handlers.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use cascade_core::config::{EngineConfig, ReenqueueDelays};
use cascade_core::events::EventPublisher;
use cascade_core::handler::{StepContext, StepHandler, StepHandlerError};
use cascade_core::models::{Task, TaskRequest, TaskTemplate, WorkflowStep};
use cascade_core::orchestration::{
    ChannelPassScheduler, PassOutcome, PassRequest, TaskInitializer, WorkflowCoordinator,
};
use cascade_core::registry::StepHandlerRegistry;
use cascade_core::state_machine::{TaskState, WorkflowStepState};
use cascade_core::store::{MemoryStore, WorkflowStore};

/// Engine configuration with zeroed delays so multi-pass scenarios run
/// instantly under test.
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.backoff.base_delay_seconds = 0;
    config.backoff.buffer_seconds = 0;
    config.backoff.default_reenqueue_delay = 0;
    config.backoff.reenqueue_delays = ReenqueueDelays {
        has_ready_steps: 0,
        waiting_for_dependencies: 0,
        processing: 0,
    };
    config
}

/// A fully wired engine over the in-memory store
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub registry: Arc<StepHandlerRegistry>,
    pub publisher: EventPublisher,
    pub coordinator: WorkflowCoordinator,
    pub initializer: TaskInitializer,
    /// Kept alive so pass scheduling succeeds; tests drive passes directly
    pub scheduled_passes: mpsc::UnboundedReceiver<PassRequest>,
}

impl TestHarness {
    pub fn new(config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(StepHandlerRegistry::new());
        let publisher = EventPublisher::default();
        let (scheduler, scheduled_passes) = ChannelPassScheduler::new();

        let coordinator = WorkflowCoordinator::new(
            store.clone(),
            registry.clone(),
            publisher.clone(),
            Arc::new(scheduler),
            config,
        );
        let initializer = TaskInitializer::new(store.clone(), publisher.clone());

        Self {
            store,
            registry,
            publisher,
            coordinator,
            initializer,
            scheduled_passes,
        }
    }

    pub async fn create_task(&self, template: &TaskTemplate) -> Task {
        let (task, _) = self
            .initializer
            .create_task(
                template,
                TaskRequest::new(template.name.clone(), template.namespace.clone())
                    .with_version(template.version.clone())
                    .with_context(json!({"test": true})),
            )
            .await
            .expect("task initialization failed");
        task
    }

    /// Drive passes until the finalizer reaches a terminal decision
    pub async fn run_until_terminal(&self, task_id: i64, max_passes: usize) -> PassOutcome {
        for _ in 0..max_passes {
            let outcome = self
                .coordinator
                .run_pass(task_id)
                .await
                .expect("processing pass failed");
            if outcome.is_terminal() {
                return outcome;
            }
        }
        panic!("task {task_id} did not reach a terminal state within {max_passes} passes");
    }

    pub async fn task_state(&self, task_id: i64) -> TaskState {
        self.store
            .current_task_state(task_id)
            .await
            .unwrap()
            .unwrap_or_default()
    }

    pub async fn step_by_name(&self, task_id: i64, name: &str) -> WorkflowStep {
        self.store
            .steps_for_task(task_id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("no step named {name}"))
    }

    pub async fn step_state(&self, step_id: i64) -> WorkflowStepState {
        self.store
            .current_step_state(step_id)
            .await
            .unwrap()
            .unwrap_or_default()
    }
}

/// Succeeds immediately, echoing the step name
pub struct SucceedHandler;

#[async_trait]
impl StepHandler for SucceedHandler {
    async fn process(&self, context: &StepContext) -> Result<Value, StepHandlerError> {
        Ok(json!({"status": "ok", "step": context.step.name}))
    }
}

/// Fails with a retryable error a fixed number of times, then succeeds
pub struct FlakyHandler {
    failures_remaining: AtomicUsize,
}

impl FlakyHandler {
    pub fn failing(times: usize) -> Self {
        Self {
            failures_remaining: AtomicUsize::new(times),
        }
    }
}

#[async_trait]
impl StepHandler for FlakyHandler {
    async fn process(&self, context: &StepContext) -> Result<Value, StepHandlerError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(StepHandlerError::retryable("transient upstream failure"));
        }
        Ok(json!({"status": "ok", "step": context.step.name, "attempt": context.attempt}))
    }
}

/// Always fails; classification chosen at construction
pub struct AlwaysFailHandler {
    permanent: bool,
}

impl AlwaysFailHandler {
    pub fn retryable() -> Self {
        Self { permanent: false }
    }

    pub fn permanent() -> Self {
        Self { permanent: true }
    }
}

#[async_trait]
impl StepHandler for AlwaysFailHandler {
    async fn process(&self, _context: &StepContext) -> Result<Value, StepHandlerError> {
        if self.permanent {
            Err(StepHandlerError::permanent("unrecoverable input"))
        } else {
            Err(StepHandlerError::retryable("dependency flapping"))
        }
    }
}

/// Fails once with a rate-limit hint, then succeeds
pub struct RateLimitedOnceHandler {
    retry_after_seconds: u32,
    fired: AtomicUsize,
}

impl RateLimitedOnceHandler {
    pub fn new(retry_after_seconds: u32) -> Self {
        Self {
            retry_after_seconds,
            fired: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StepHandler for RateLimitedOnceHandler {
    async fn process(&self, _context: &StepContext) -> Result<Value, StepHandlerError> {
        if self.fired.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(StepHandlerError::rate_limited(
                self.retry_after_seconds,
                "429 from upstream",
            ));
        }
        Ok(json!({"status": "ok"}))
    }
}

/// Sleeps before succeeding; used to exercise timeouts and overlap
pub struct SlowHandler {
    pub delay: Duration,
}

#[async_trait]
impl StepHandler for SlowHandler {
    async fn process(&self, context: &StepContext) -> Result<Value, StepHandlerError> {
        tokio::time::sleep(self.delay).await;
        Ok(json!({"status": "ok", "step": context.step.name}))
    }
}

/// Counts invocations; optionally sleeps to widen race windows
pub struct CountingHandler {
    pub invocations: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl CountingHandler {
    pub fn new(invocations: Arc<AtomicUsize>, delay: Duration) -> Self {
        Self { invocations, delay }
    }
}

#[async_trait]
impl StepHandler for CountingHandler {
    async fn process(&self, context: &StepContext) -> Result<Value, StepHandlerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(json!({"status": "ok", "step": context.step.name}))
    }
}
