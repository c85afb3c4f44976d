use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events that can trigger task state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Begin a processing pass
    Start,
    /// Mark the task complete
    Complete,
    /// Mark the task failed with an error message
    Fail(String),
    /// Return the task to pending ahead of another scheduled pass
    Reenqueue,
    /// Reset a failed task back to pending for manual recovery
    Reset,
    /// Cancel the task
    Cancel,
    /// Manually resolve the task
    ResolveManually,
}

impl TaskEvent {
    /// String representation of the event type for logging and audit rows
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Reenqueue => "reenqueue",
            Self::Reset => "reset",
            Self::Cancel => "cancel",
            Self::ResolveManually => "resolve_manually",
        }
    }

    /// Extract the error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

/// Events that can trigger workflow step state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StepEvent {
    /// Begin handler execution. Also used to retry a step out of the error
    /// state; the retry-eligibility guard decides whether that is allowed.
    Start,
    /// Mark the step complete with optional handler results
    Complete(Option<Value>),
    /// Mark the step failed with an error message
    Fail(String),
    /// Cancel the step
    Cancel,
    /// Manually resolve the step
    ResolveManually,
}

impl StepEvent {
    /// String representation of the event type for logging and audit rows
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete(_) => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
            Self::ResolveManually => "resolve_manually",
        }
    }

    /// Extract the error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Extract handler results if this is a completion event
    pub fn results(&self) -> Option<&Value> {
        match self {
            Self::Complete(results) => results.as_ref(),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }

    /// Create a completion event carrying handler results
    pub fn complete_with_results(results: Value) -> Self {
        Self::Complete(Some(results))
    }
}
