//! # Step Handler Contract
//!
//! The boundary between the orchestration core and application business
//! logic. Applications implement [`StepHandler`] per step kind; the engine
//! invokes `process` exactly once per execution attempt, treats any
//! returned error as step failure, and stores the returned value as the
//! step's `results`.
//!
//! [`StepHandlerError`] is the caller's error taxonomy: the classification
//! (permanent vs retryable vs rate-limited) determines the step's
//! `retryable` flag and `backoff_request_seconds` going forward. The
//! executor itself treats all failures uniformly and defers
//! retry-worthiness to the next readiness computation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::models::{Task, WorkflowStep};

/// Everything a handler gets to see for one execution attempt
#[derive(Debug, Clone)]
pub struct StepContext {
    pub task: Task,
    pub step: WorkflowStep,
    /// Task-level opaque input context
    pub task_context: Value,
    /// Results of this step's parents, keyed by parent step name
    pub previous_results: HashMap<String, Value>,
    /// 1-based attempt number for this invocation
    pub attempt: i32,
}

/// Classified step handler failure
#[derive(Debug, thiserror::Error)]
pub enum StepHandlerError {
    /// Not worth retrying; the step's retry budget is voided
    #[error("permanent failure: {message}")]
    Permanent { message: String },

    /// Transient; retry after the engine-computed backoff
    #[error("retryable failure: {message}")]
    Retryable { message: String },

    /// The upstream service asked us to back off for a specific interval
    #[error("rate limited, retry after {retry_after_seconds}s: {message}")]
    RateLimited {
        retry_after_seconds: u32,
        message: String,
    },

    /// Unclassified error chain; treated as retryable
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StepHandlerError {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
        }
    }

    pub fn rate_limited(retry_after_seconds: u32, message: impl Into<String>) -> Self {
        Self::RateLimited {
            retry_after_seconds,
            message: message.into(),
        }
    }

    /// Whether this failure voids the step's retry budget
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }

    /// Explicit backoff requested by the failure, if any
    pub fn requested_backoff_seconds(&self) -> Option<u32> {
        match self {
            Self::RateLimited {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

/// Application-supplied step execution logic
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Execute the step. Called exactly once per execution attempt.
    async fn process(&self, context: &StepContext) -> Result<Value, StepHandlerError>;

    /// Refine the output of `process` before it is stored as the step's
    /// results. Default implementation passes the output through.
    async fn process_results(
        &self,
        context: &StepContext,
        process_output: &Value,
    ) -> Result<Value, StepHandlerError> {
        let _ = context;
        Ok(process_output.clone())
    }

    /// Handler name for logging and debugging
    fn handler_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
