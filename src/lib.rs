#![allow(clippy::missing_errors_doc)] // Public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Methods without must_use when context is clear

//! # Cascade Core
//!
//! Durable workflow orchestration engine. Tasks decompose into a DAG of
//! steps; the engine repeatedly discovers which steps are viable
//! (dependencies satisfied, not yet processed, not in backoff), executes
//! them, and finalizes the task when no further progress is possible.
//!
//! ## Architecture
//!
//! One **processing pass** = discovery → execution → finalization:
//!
//! - [`orchestration::ViableStepDiscovery`] queries the derived
//!   [`models::StepReadinessStatus`] projection for the executable frontier;
//! - [`orchestration::StepExecutor`] runs the frontier (sequentially or on
//!   a bounded pool), driving each step's [`state_machine::StepStateMachine`];
//! - [`orchestration::TaskFinalizer`] reads the derived
//!   [`models::TaskExecutionContext`] and decides: complete, reenqueue
//!   (now or delayed), or error.
//!
//! Continuation across passes happens through
//! [`orchestration::TaskReenqueuer`] and the host-provided
//! [`orchestration::PassScheduler`]; the coordinator never loops.
//!
//! All status mutation flows through guarded state machines whose
//! transitions are durably recorded in append-only logs; readiness and
//! execution context are pure read-side projections recomputed on every
//! call. Persistence lives behind the [`store::WorkflowStore`] trait.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cascade_core::config::EngineConfig;
//! use cascade_core::events::EventPublisher;
//! use cascade_core::models::{StepTemplate, TaskRequest, TaskTemplate};
//! use cascade_core::orchestration::{
//!     ChannelPassScheduler, TaskInitializer, WorkflowCoordinator,
//! };
//! use cascade_core::registry::StepHandlerRegistry;
//! use cascade_core::store::MemoryStore;
//!
//! # async fn example() -> cascade_core::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let registry = Arc::new(StepHandlerRegistry::new());
//! let publisher = EventPublisher::default();
//! let (scheduler, mut passes) = ChannelPassScheduler::new();
//!
//! let coordinator = WorkflowCoordinator::new(
//!     store.clone(),
//!     registry,
//!     publisher.clone(),
//!     Arc::new(scheduler),
//!     EngineConfig::default(),
//! );
//!
//! let template = TaskTemplate::new(
//!     "etl",
//!     "data",
//!     "1.0.0",
//!     vec![StepTemplate::new("extract", "extract_handler")],
//! );
//! let initializer = TaskInitializer::new(store, publisher);
//! let (task, _) = initializer
//!     .create_task(&template, TaskRequest::new("etl", "data"))
//!     .await?;
//!
//! // Worker loop: one pass per scheduled request
//! coordinator.run_pass(task.task_id).await?;
//! while let Some(request) = passes.recv().await {
//!     let outcome = coordinator.run_pass(request.task_id).await?;
//!     if outcome.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod handler;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod store;

pub use config::EngineConfig;
pub use constants::{ExecutionStatus, HealthStatus, RecommendedAction, ReenqueueReason};
pub use error::{CascadeError, Result};
pub use events::EventPublisher;
pub use handler::{StepContext, StepHandler, StepHandlerError};
pub use models::{
    StepReadinessStatus, StepTemplate, Task, TaskExecutionContext, TaskRequest, TaskTemplate,
    WorkflowStep,
};
pub use orchestration::{PassOutcome, WorkflowCoordinator};
pub use registry::StepHandlerRegistry;
pub use state_machine::{TaskState, WorkflowStepState};
pub use store::{MemoryStore, WorkflowStore};
