//! # System Constants
//!
//! Core enums and constants that define the operational vocabulary of the
//! orchestration engine: execution statuses, recommended actions, reenqueue
//! reasons, and the lifecycle event names published on the event bus.

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export state types under their status aliases for convenience
pub use crate::state_machine::{TaskState as TaskStatus, WorkflowStepState as WorkflowStepStatus};

/// Lifecycle event names published through the [`EventPublisher`](crate::events::EventPublisher)
pub mod events {
    // Task lifecycle events
    pub const TASK_INITIALIZED: &str = "task.initialized";
    pub const TASK_STARTED: &str = "task.started";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_CANCELLED: &str = "task.cancelled";

    // Step lifecycle events
    pub const STEP_EXECUTION_STARTED: &str = "step.execution_started";
    pub const STEP_EXECUTION_COMPLETED: &str = "step.execution_completed";
    pub const STEP_EXECUTION_FAILED: &str = "step.execution_failed";
    pub const STEP_BACKOFF_APPLIED: &str = "step.backoff_applied";

    // Orchestration events
    pub const VIABLE_STEPS_DISCOVERED: &str = "workflow.viable_steps_discovered";
    pub const NO_VIABLE_STEPS: &str = "workflow.no_viable_steps";
    pub const FINALIZATION_STARTED: &str = "task.finalization_started";
    pub const FINALIZATION_COMPLETED: &str = "task.finalization_completed";

    // Reenqueue events
    pub const REENQUEUE_STARTED: &str = "task.reenqueue_started";
    pub const REENQUEUE_COMPLETED: &str = "task.reenqueue_completed";
    pub const REENQUEUE_FAILED: &str = "task.reenqueue_failed";

    // State machine events (generic; payload carries entity/from/to)
    pub const TASK_TRANSITION: &str = "task.transition";
    pub const STEP_TRANSITION: &str = "step.transition";
}

/// Aggregate execution status of a task, derived from its step-state multiset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every step is in a completion state
    AllComplete,
    /// At least one step is ready for execution right now
    HasReadySteps,
    /// Steps are currently executing
    Processing,
    /// No step is ready now, but retry-eligible failures or backoff windows remain
    WaitingForDependencies,
    /// At least one step has permanently failed and nothing else can proceed
    BlockedByFailures,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllComplete => "all_complete",
            Self::HasReadySteps => "has_ready_steps",
            Self::Processing => "processing",
            Self::WaitingForDependencies => "waiting_for_dependencies",
            Self::BlockedByFailures => "blocked_by_failures",
        }
    }

    /// Check if this status indicates work can happen in this pass or the next
    pub fn is_active(&self) -> bool {
        matches!(self, Self::HasReadySteps | Self::Processing)
    }

    /// Check if this status is terminal for the task
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AllComplete | Self::BlockedByFailures)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended next action, paired with [`ExecutionStatus`] in the execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    FinalizeTask,
    ExecuteReadySteps,
    WaitForCompletion,
    WaitForDependencies,
    HandleFailures,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinalizeTask => "finalize_task",
            Self::ExecuteReadySteps => "execute_ready_steps",
            Self::WaitForCompletion => "wait_for_completion",
            Self::WaitForDependencies => "wait_for_dependencies",
            Self::HandleFailures => "handle_failures",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task health indicator derived from the execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Recovering,
    Blocked,
    Unknown,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy | Self::Recovering)
    }
}

/// Why a task is being scheduled for another processing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReenqueueReason {
    ReadyStepsAvailable,
    AwaitingDependencies,
    StepsInProgress,
    RetryBackoff,
    ContinuingWorkflow,
}

impl ReenqueueReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadyStepsAvailable => "ready_steps_available",
            Self::AwaitingDependencies => "awaiting_dependencies",
            Self::StepsInProgress => "steps_in_progress",
            Self::RetryBackoff => "retry_backoff",
            Self::ContinuingWorkflow => "continuing_workflow",
        }
    }
}

impl fmt::Display for ReenqueueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System-wide limits
pub mod system {
    /// Maximum recursion depth for dependency resolution
    pub const MAX_DEPENDENCY_DEPTH: usize = 50;

    /// Maximum number of steps in a single workflow
    pub const MAX_WORKFLOW_STEPS: usize = 1000;

    /// Default dependency edge name
    pub const PROVIDES_EDGE_NAME: &str = "provides";
}

/// Status groupings used by rollup and guard logic
pub mod status_groups {
    use super::WorkflowStepStatus;

    /// Step statuses that count toward task completion
    pub const STEP_COMPLETION_STATES: &[WorkflowStepStatus] = &[
        WorkflowStepStatus::Complete,
        WorkflowStepStatus::ResolvedManually,
        WorkflowStepStatus::Cancelled,
    ];

    /// Step statuses that make a step unavailable for execution
    pub const UNREADY_STEP_STATES: &[WorkflowStepStatus] = &[
        WorkflowStepStatus::InProgress,
        WorkflowStepStatus::Complete,
        WorkflowStepStatus::Cancelled,
        WorkflowStepStatus::ResolvedManually,
    ];
}
