//! # Lifecycle Events
//!
//! Broadcast-based event bus for orchestration lifecycle events, consumed
//! by telemetry and observability collaborators. Publishing is
//! fire-and-forget: the core never depends on subscribers existing or
//! succeeding.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};

use serde_json::json;

use crate::constants::events;
use crate::orchestration::types::ViableStep;

impl EventPublisher {
    /// Announce the discovered frontier for a pass
    pub async fn publish_viable_steps_discovered(
        &self,
        task_id: i64,
        steps: &[ViableStep],
    ) -> Result<(), PublishError> {
        let name = if steps.is_empty() {
            events::NO_VIABLE_STEPS
        } else {
            events::VIABLE_STEPS_DISCOVERED
        };
        self.publish(
            name,
            json!({
                "task_id": task_id,
                "step_count": steps.len(),
                "step_ids": steps.iter().map(|s| s.step_id).collect::<Vec<_>>(),
            }),
        )
        .await
    }

    pub async fn publish_step_execution_started(
        &self,
        task_id: i64,
        step_id: i64,
        step_name: &str,
    ) -> Result<(), PublishError> {
        self.publish(
            events::STEP_EXECUTION_STARTED,
            json!({
                "task_id": task_id,
                "step_id": step_id,
                "step_name": step_name,
            }),
        )
        .await
    }

    pub async fn publish_step_execution_completed(
        &self,
        task_id: i64,
        step_id: i64,
        step_name: &str,
        duration_ms: u128,
    ) -> Result<(), PublishError> {
        self.publish(
            events::STEP_EXECUTION_COMPLETED,
            json!({
                "task_id": task_id,
                "step_id": step_id,
                "step_name": step_name,
                "duration_ms": duration_ms,
            }),
        )
        .await
    }

    pub async fn publish_step_execution_failed(
        &self,
        task_id: i64,
        step_id: i64,
        step_name: &str,
        error: &str,
        attempts: i32,
    ) -> Result<(), PublishError> {
        self.publish(
            events::STEP_EXECUTION_FAILED,
            json!({
                "task_id": task_id,
                "step_id": step_id,
                "step_name": step_name,
                "error": error,
                "attempts": attempts,
            }),
        )
        .await
    }
}
