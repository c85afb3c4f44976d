//! # Task Reenqueuer
//!
//! Mechanics of scheduling the next processing pass for a task. Reenqueuing
//! transitions the task state machine back to `pending` (a no-op if already
//! pending) and hands a [`PassRequest`] to the [`PassScheduler`], the
//! boundary onto whatever job/timer infrastructure the host provides.
//!
//! A scheduling failure returns an error instead of raising, and is always
//! published as a `task.reenqueue_failed` event first: silently losing a
//! reenqueue would stall a task forever, so this path must be monitorable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::constants::{events, ReenqueueReason};
use crate::events::{EventPublisher, PublishError};
use crate::models::Task;
use crate::state_machine::{StateMachineError, TaskEvent, TaskState, TaskStateMachine};
use crate::store::{StoreError, WorkflowStore};

/// Priority levels for reenqueued passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReenqueuePriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

/// A request to schedule another processing pass
#[derive(Debug, Clone)]
pub struct ReenqueueRequest {
    pub reason: ReenqueueReason,
    pub delay: Duration,
    pub priority: ReenqueuePriority,
    pub metadata: HashMap<String, Value>,
}

impl ReenqueueRequest {
    pub fn new(reason: ReenqueueReason) -> Self {
        Self {
            reason,
            delay: Duration::ZERO,
            priority: ReenqueuePriority::default(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_priority(mut self, priority: ReenqueuePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_delayed(&self) -> bool {
        !self.delay.is_zero()
    }
}

/// Result of a successful reenqueue
#[derive(Debug, Clone)]
pub struct ReenqueueResult {
    pub task_id: i64,
    pub reason: ReenqueueReason,
    pub delay: Duration,
    pub scheduled_for: DateTime<Utc>,
    /// Whether the `in_progress -> pending` transition was applied (false
    /// when the task was already pending)
    pub transitioned_to_pending: bool,
}

/// Scheduling backend failures
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("pass scheduler channel is closed")]
    ChannelClosed,

    #[error("scheduling backend failure: {0}")]
    Backend(String),
}

/// Reenqueue operation failures
#[derive(Debug, thiserror::Error)]
pub enum ReenqueueError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("event publishing error: {0}")]
    Event(#[from] PublishError),

    #[error("scheduling failure: {0}")]
    Schedule(#[from] ScheduleError),
}

/// A scheduled processing pass
#[derive(Debug, Clone)]
pub struct PassRequest {
    pub task_id: i64,
    pub delay: Duration,
    pub reason: ReenqueueReason,
    pub priority: ReenqueuePriority,
    pub requested_at: DateTime<Utc>,
}

/// "Enqueue a processing pass for task X, optionally after delay D",
/// backed by whatever job/timer infrastructure the host environment has.
#[async_trait]
pub trait PassScheduler: Send + Sync {
    async fn schedule_pass(&self, request: PassRequest) -> Result<(), ScheduleError>;
}

/// Tokio-native scheduler delivering pass requests over an mpsc channel
/// after the requested delay. The receiving half is the host's worker loop.
pub struct ChannelPassScheduler {
    sender: mpsc::UnboundedSender<PassRequest>,
}

impl ChannelPassScheduler {
    /// Create the scheduler and the receiver the worker loop consumes
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PassRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl PassScheduler for ChannelPassScheduler {
    async fn schedule_pass(&self, request: PassRequest) -> Result<(), ScheduleError> {
        if self.sender.is_closed() {
            return Err(ScheduleError::ChannelClosed);
        }
        if request.delay.is_zero() {
            return self
                .sender
                .send(request)
                .map_err(|_| ScheduleError::ChannelClosed);
        }
        let sender = self.sender.clone();
        let delay = request.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = sender.send(request) {
                error!(task_id = e.0.task_id, "Delayed pass request dropped: worker channel closed");
            }
        });
        Ok(())
    }
}

/// Transitions tasks back to pending and schedules their next pass
pub struct TaskReenqueuer {
    store: Arc<dyn WorkflowStore>,
    publisher: EventPublisher,
    scheduler: Arc<dyn PassScheduler>,
}

impl TaskReenqueuer {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        publisher: EventPublisher,
        scheduler: Arc<dyn PassScheduler>,
    ) -> Self {
        Self {
            store,
            publisher,
            scheduler,
        }
    }

    /// Reenqueue a task for another processing pass.
    ///
    /// Idempotent on task state: a task already pending is left as is and
    /// only the scheduling side effect happens.
    pub async fn reenqueue(
        &self,
        task: &Task,
        request: ReenqueueRequest,
    ) -> Result<ReenqueueResult, ReenqueueError> {
        let task_id = task.task_id;
        self.publisher
            .publish(
                events::REENQUEUE_STARTED,
                json!({
                    "task_id": task_id,
                    "reason": request.reason,
                    "delay_seconds": request.delay.as_secs(),
                }),
            )
            .await?;

        let mut machine =
            TaskStateMachine::new(task.clone(), self.store.clone(), self.publisher.clone());
        let current = machine.current_state().await?;
        let transitioned_to_pending = if current == TaskState::Pending {
            debug!(task_id, "Task already pending, reenqueue transition skipped");
            false
        } else {
            machine
                .safe_transition(TaskEvent::Reenqueue)
                .await?
                .was_applied()
        };

        let pass = PassRequest {
            task_id,
            delay: request.delay,
            reason: request.reason,
            priority: request.priority,
            requested_at: Utc::now(),
        };
        let scheduled_for = pass.requested_at + chrono::Duration::from_std(request.delay)
            .unwrap_or_else(|_| chrono::Duration::seconds(0));

        match self.scheduler.schedule_pass(pass).await {
            Ok(()) => {
                self.publisher
                    .publish(
                        events::REENQUEUE_COMPLETED,
                        json!({
                            "task_id": task_id,
                            "reason": request.reason,
                            "delay_seconds": request.delay.as_secs(),
                            "scheduled_for": scheduled_for,
                        }),
                    )
                    .await?;
                info!(
                    task_id,
                    reason = %request.reason,
                    delay_seconds = request.delay.as_secs(),
                    "Task reenqueued"
                );
                Ok(ReenqueueResult {
                    task_id,
                    reason: request.reason,
                    delay: request.delay,
                    scheduled_for,
                    transitioned_to_pending,
                })
            }
            Err(schedule_error) => {
                // Surface the failure before returning it; a silently lost
                // reenqueue stalls the task forever.
                error!(
                    task_id,
                    error = %schedule_error,
                    "Failed to schedule next processing pass"
                );
                self.publisher
                    .publish(
                        events::REENQUEUE_FAILED,
                        json!({
                            "task_id": task_id,
                            "reason": request.reason,
                            "error": schedule_error.to_string(),
                        }),
                    )
                    .await?;
                Err(schedule_error.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_scheduler_delivers_immediate_requests() {
        let (scheduler, mut receiver) = ChannelPassScheduler::new();
        scheduler
            .schedule_pass(PassRequest {
                task_id: 7,
                delay: Duration::ZERO,
                reason: ReenqueueReason::ReadyStepsAvailable,
                priority: ReenqueuePriority::High,
                requested_at: Utc::now(),
            })
            .await
            .unwrap();

        let delivered = receiver.recv().await.unwrap();
        assert_eq!(delivered.task_id, 7);
        assert_eq!(delivered.reason, ReenqueueReason::ReadyStepsAvailable);
    }

    #[tokio::test]
    async fn channel_scheduler_reports_closed_channel() {
        let (scheduler, receiver) = ChannelPassScheduler::new();
        drop(receiver);

        let result = scheduler
            .schedule_pass(PassRequest {
                task_id: 7,
                delay: Duration::ZERO,
                reason: ReenqueueReason::ContinuingWorkflow,
                priority: ReenqueuePriority::Normal,
                requested_at: Utc::now(),
            })
            .await;
        assert!(matches!(result, Err(ScheduleError::ChannelClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn channel_scheduler_honors_delay() {
        let (scheduler, mut receiver) = ChannelPassScheduler::new();
        scheduler
            .schedule_pass(PassRequest {
                task_id: 9,
                delay: Duration::from_secs(30),
                reason: ReenqueueReason::RetryBackoff,
                priority: ReenqueuePriority::Normal,
                requested_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(receiver.try_recv().is_err());
        tokio::time::advance(Duration::from_secs(31)).await;
        let delivered = receiver.recv().await.unwrap();
        assert_eq!(delivered.task_id, 9);
    }
}
