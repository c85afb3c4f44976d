//! # Orchestration Engine
//!
//! The orchestration core: repeated processing passes that discover the
//! viable step frontier, execute it, and finalize the task when no further
//! progress is possible.
//!
//! ## Components
//!
//! - [`ViableStepDiscovery`]: computes the executable frontier from the
//!   readiness projection
//! - [`StepExecutor`]: sequential or concurrent batch execution with the
//!   per-step claim/transition/handler protocol
//! - [`BackoffCalculator`]: server-requested vs exponential backoff for
//!   failed steps
//! - [`TaskFinalizer`] + [`DelayCalculator`]: the per-pass decision table
//!   (complete, reenqueue now, reenqueue delayed, error)
//! - [`TaskReenqueuer`] + [`PassScheduler`]: scheduling of the next pass
//! - [`WorkflowCoordinator`]: wires one pass end to end
//! - [`TaskInitializer`]: creates tasks and DAGs from typed templates

pub mod backoff_calculator;
pub mod step_executor;
pub mod task_finalizer;
pub mod task_initializer;
pub mod task_reenqueuer;
pub mod types;
pub mod viable_step_discovery;
pub mod workflow_coordinator;

pub use backoff_calculator::{BackoffCalculator, BackoffError, BackoffResult, BackoffType};
pub use step_executor::{ExecutionError, StepExecutor};
pub use task_finalizer::{
    DelayCalculator, FinalizationAction, FinalizationError, FinalizationResult, TaskFinalizer,
};
pub use task_initializer::{InitializationError, TaskInitializationResult, TaskInitializer};
pub use task_reenqueuer::{
    ChannelPassScheduler, PassRequest, PassScheduler, ReenqueueError, ReenqueuePriority,
    ReenqueueRequest, ReenqueueResult, ScheduleError, TaskReenqueuer,
};
pub use types::{
    DiscoveredSteps, ProcessingMode, StepExecutionOutcome, StepOutcomeStatus, ViableStep,
};
pub use viable_step_discovery::{DiscoveryError, ViableStepDiscovery};
pub use workflow_coordinator::{PassOutcome, WorkflowCoordinator};
