use serde::{Deserialize, Serialize};
use std::fmt;

/// Task state definitions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Initial state, and the state a task returns to when reenqueued
    #[default]
    Pending,
    /// A processing pass is actively working the task
    InProgress,
    /// Task completed successfully
    Complete,
    /// Task failed permanently
    Error,
    /// Task was cancelled
    Cancelled,
    /// Task was manually resolved by an operator
    ResolvedManually,
}

impl TaskState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Cancelled | Self::ResolvedManually
        )
    }

    /// Check if this is an error state that may allow recovery
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Check if a processing pass is active
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::ResolvedManually => "resolved_manually",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            "resolved_manually" => Ok(Self::ResolvedManually),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

/// Workflow step state definitions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStepState {
    /// Initial state when the step is created
    #[default]
    Pending,
    /// Step handler is executing
    InProgress,
    /// Step completed successfully
    Complete,
    /// Step failed; may be retried while retry-eligible
    Error,
    /// Step was cancelled
    Cancelled,
    /// Step was manually resolved by an operator
    ResolvedManually,
}

impl WorkflowStepState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Cancelled | Self::ResolvedManually
        )
    }

    /// Check if this is an error state that may allow retry
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Check if the step handler is currently executing
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// Check if this state satisfies dependency edges for child steps
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Complete | Self::ResolvedManually)
    }
}

impl fmt::Display for WorkflowStepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::ResolvedManually => "resolved_manually",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for WorkflowStepState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            "resolved_manually" => Ok(Self::ResolvedManually),
            _ => Err(format!("Invalid workflow step state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_terminal_check() {
        assert!(TaskState::Complete.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(TaskState::ResolvedManually.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::InProgress.is_terminal());
        assert!(!TaskState::Error.is_terminal());
    }

    #[test]
    fn step_state_dependency_satisfaction() {
        assert!(WorkflowStepState::Complete.satisfies_dependencies());
        assert!(WorkflowStepState::ResolvedManually.satisfies_dependencies());
        assert!(!WorkflowStepState::Pending.satisfies_dependencies());
        assert!(!WorkflowStepState::InProgress.satisfies_dependencies());
        assert!(!WorkflowStepState::Error.satisfies_dependencies());
        assert!(!WorkflowStepState::Cancelled.satisfies_dependencies());
    }

    #[test]
    fn state_string_conversion() {
        assert_eq!(TaskState::InProgress.to_string(), "in_progress");
        assert_eq!(
            "complete".parse::<TaskState>().unwrap(),
            TaskState::Complete
        );
        assert_eq!(WorkflowStepState::Error.to_string(), "error");
        assert!("nonsense".parse::<WorkflowStepState>().is_err());
    }
}
