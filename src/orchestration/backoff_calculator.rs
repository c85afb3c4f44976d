//! # Backoff Calculator
//!
//! Unified handling of server-requested and exponential backoff for failed
//! steps. A rate-limited failure's requested delay is capped and persisted
//! to the step's `backoff_request_seconds` so readiness honors it; computed
//! exponential backoff is derived from `attempts` at readiness-evaluation
//! time and is only previewed here for events and logs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::BackoffConfig;
use crate::constants::events;
use crate::events::{EventPublisher, PublishError};
use crate::handler::StepHandlerError;
use crate::models::WorkflowStep;
use crate::store::{StepExecutionUpdate, StoreError, WorkflowStore};

/// Which backoff rule produced the delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// The failing service asked for a specific delay
    ServerRequested,
    /// Engine-computed exponential backoff
    Exponential,
}

/// Result of a backoff decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffResult {
    pub delay_seconds: i64,
    pub backoff_type: BackoffType,
    pub next_retry_at: DateTime<Utc>,
}

/// Backoff application failures
#[derive(Debug, thiserror::Error)]
pub enum BackoffError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("event publishing error: {0}")]
    Event(#[from] PublishError),
}

/// Applies backoff decisions to failed steps
#[derive(Clone)]
pub struct BackoffCalculator {
    store: Arc<dyn WorkflowStore>,
    publisher: EventPublisher,
    config: BackoffConfig,
}

impl BackoffCalculator {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        publisher: EventPublisher,
        config: BackoffConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Decide and record the backoff for a classified step failure.
    ///
    /// `step` must already carry the post-failure attempt count.
    pub async fn apply_failure_backoff(
        &self,
        step: &WorkflowStep,
        failure: &StepHandlerError,
        now: DateTime<Utc>,
    ) -> Result<BackoffResult, BackoffError> {
        let result = match failure.requested_backoff_seconds() {
            Some(requested) => {
                let delay_seconds =
                    i64::from(requested).min(self.config.max_delay_seconds as i64);
                self.store
                    .update_step_execution(
                        step.workflow_step_id,
                        StepExecutionUpdate::default()
                            .set_backoff_request_seconds(Some(delay_seconds as i32)),
                    )
                    .await?;
                BackoffResult {
                    delay_seconds,
                    backoff_type: BackoffType::ServerRequested,
                    next_retry_at: now + Duration::seconds(delay_seconds),
                }
            }
            None => {
                let delay_seconds =
                    self.apply_jitter(self.config.exponential_backoff_seconds(step.attempts));
                BackoffResult {
                    delay_seconds,
                    backoff_type: BackoffType::Exponential,
                    next_retry_at: now + Duration::seconds(delay_seconds),
                }
            }
        };

        debug!(
            task_id = step.task_id,
            step_id = step.workflow_step_id,
            attempts = step.attempts,
            delay_seconds = result.delay_seconds,
            backoff_type = ?result.backoff_type,
            "Applied step backoff"
        );

        self.publisher
            .publish(
                events::STEP_BACKOFF_APPLIED,
                serde_json::json!({
                    "task_id": step.task_id,
                    "step_id": step.workflow_step_id,
                    "delay_seconds": result.delay_seconds,
                    "backoff_type": result.backoff_type,
                    "next_retry_at": result.next_retry_at,
                }),
            )
            .await?;

        Ok(result)
    }

    fn apply_jitter(&self, delay_seconds: i64) -> i64 {
        if !self.config.jitter_enabled || delay_seconds == 0 {
            return delay_seconds;
        }
        use rand::Rng;
        let jitter_range = (delay_seconds as f64 * self.config.jitter_max_percentage) as i64;
        if jitter_range == 0 {
            return delay_seconds;
        }
        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(0..=jitter_range);
        if rng.gen_bool(0.5) {
            delay_seconds.saturating_add(jitter)
        } else {
            delay_seconds.saturating_sub(jitter)
        }
    }
}
