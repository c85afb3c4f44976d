//! # Viable Step Discovery
//!
//! Computes the executable frontier for a task: every step whose
//! dependencies are satisfied and which is eligible to run right now (not
//! processed, not in flight, not inside a backoff window). Discovery is a
//! read-only projection over the readiness snapshot; an empty frontier is a
//! normal per-pass outcome, not a failure.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::{BackoffConfig, ExecutionConfig, ProcessingModePolicy};
use crate::events::{EventPublisher, PublishError};
use crate::models::{StepReadinessStatus, TaskReadinessSummary};
use crate::store::{StoreError, WorkflowStore};

use super::types::{DiscoveredSteps, ProcessingMode, ViableStep};

/// Discovery failures
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("event publishing error: {0}")]
    Event(#[from] PublishError),
}

/// Ready-frontier discovery engine
pub struct ViableStepDiscovery {
    store: Arc<dyn WorkflowStore>,
    publisher: EventPublisher,
    execution: ExecutionConfig,
    backoff: BackoffConfig,
}

impl ViableStepDiscovery {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        publisher: EventPublisher,
        execution: ExecutionConfig,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            execution,
            backoff,
        }
    }

    /// Find every step of the task that is ready for execution, plus the
    /// processing-mode hint for this pass.
    #[instrument(skip(self), fields(task_id = task_id))]
    pub async fn discover_steps_for_task(
        &self,
        task_id: i64,
    ) -> Result<DiscoveredSteps, DiscoveryError> {
        let now = Utc::now();
        let readiness =
            StepReadinessStatus::for_task(self.store.as_ref(), task_id, &self.backoff, now).await?;

        let mut steps: Vec<ViableStep> = readiness
            .iter()
            .filter(|row| row.ready_for_execution)
            .map(ViableStep::from)
            .collect();

        for step in &steps {
            debug!(
                task_id = task_id,
                step_id = step.step_id,
                step_name = %step.name,
                current_state = %step.current_state,
                attempts = step.attempts,
                "Found viable step"
            );
        }

        if steps.len() > self.execution.max_steps_per_pass {
            warn!(
                task_id = task_id,
                frontier = steps.len(),
                max_steps_per_pass = self.execution.max_steps_per_pass,
                "Ready frontier exceeds per-pass cap, truncating"
            );
            steps.truncate(self.execution.max_steps_per_pass);
        }

        let processing_mode = self.select_processing_mode(steps.len());

        info!(
            task_id = task_id,
            viable_steps = steps.len(),
            processing_mode = %processing_mode,
            "Completed viable step discovery"
        );

        self.publisher
            .publish_viable_steps_discovered(task_id, &steps)
            .await?;

        Ok(DiscoveredSteps {
            task_id,
            steps,
            processing_mode,
            discovered_at: now,
        })
    }

    /// Apply the configured processing-mode policy to a frontier width
    fn select_processing_mode(&self, ready_count: usize) -> ProcessingMode {
        match self.execution.processing_mode {
            ProcessingModePolicy::Sequential => ProcessingMode::Sequential,
            ProcessingModePolicy::Concurrent => ProcessingMode::Concurrent,
            ProcessingModePolicy::FanOut { min_ready_steps } => {
                if ready_count >= min_ready_steps {
                    ProcessingMode::Concurrent
                } else {
                    ProcessingMode::Sequential
                }
            }
        }
    }

    /// Monitoring rollup over the current readiness snapshot
    pub async fn readiness_summary(
        &self,
        task_id: i64,
    ) -> Result<TaskReadinessSummary, DiscoveryError> {
        let readiness =
            StepReadinessStatus::for_task(self.store.as_ref(), task_id, &self.backoff, Utc::now())
                .await?;
        Ok(TaskReadinessSummary::from_readiness(task_id, &readiness))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery_with_policy(policy: ProcessingModePolicy) -> ViableStepDiscovery {
        let execution = ExecutionConfig {
            processing_mode: policy,
            ..ExecutionConfig::default()
        };
        ViableStepDiscovery::new(
            Arc::new(crate::store::MemoryStore::new()),
            EventPublisher::default(),
            execution,
            BackoffConfig::default(),
        )
    }

    #[test]
    fn fan_out_policy_switches_on_frontier_width() {
        let discovery =
            discovery_with_policy(ProcessingModePolicy::FanOut { min_ready_steps: 2 });
        assert_eq!(
            discovery.select_processing_mode(1),
            ProcessingMode::Sequential
        );
        assert_eq!(
            discovery.select_processing_mode(2),
            ProcessingMode::Concurrent
        );
    }

    #[test]
    fn fixed_policies_ignore_frontier_width() {
        let sequential = discovery_with_policy(ProcessingModePolicy::Sequential);
        assert_eq!(
            sequential.select_processing_mode(50),
            ProcessingMode::Sequential
        );

        let concurrent = discovery_with_policy(ProcessingModePolicy::Concurrent);
        assert_eq!(
            concurrent.select_processing_mode(1),
            ProcessingMode::Concurrent
        );
    }
}
