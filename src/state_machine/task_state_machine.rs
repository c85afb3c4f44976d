use std::sync::Arc;
use tracing::debug;

use super::actions::{PublishTransitionEventAction, StateAction, TraceTransitionAction};
use super::errors::{StateMachineError, StateMachineResult, TransitionOutcome};
use super::events::TaskEvent;
use super::guards::{AllStepsCompleteGuard, TaskNotAlreadyInProgressGuard, TransitionGuard};
use super::persistence::TaskTransitionRecorder;
use super::states::TaskState;
use crate::events::EventPublisher;
use crate::models::Task;
use crate::store::WorkflowStore;

/// Guarded task lifecycle state machine.
///
/// Current state is always resolved from the transition log, never cached,
/// so concurrent machines over the same task converge on the same view.
pub struct TaskStateMachine {
    task: Task,
    store: Arc<dyn WorkflowStore>,
    publisher: EventPublisher,
    recorder: TaskTransitionRecorder,
}

impl TaskStateMachine {
    pub fn new(task: Task, store: Arc<dyn WorkflowStore>, publisher: EventPublisher) -> Self {
        Self {
            task,
            store,
            publisher,
            recorder: TaskTransitionRecorder,
        }
    }

    /// Current state from the transition log; default state when the log is empty
    pub async fn current_state(&self) -> StateMachineResult<TaskState> {
        Ok(self
            .store
            .current_task_state(self.task.task_id)
            .await?
            .unwrap_or_default())
    }

    /// Apply a transition. Guard and table violations are errors here; use
    /// [`safe_transition`](Self::safe_transition) where rejection is an
    /// expected outcome.
    pub async fn transition(&mut self, event: TaskEvent) -> StateMachineResult<TaskState> {
        let current_state = self.current_state().await?;
        let target_state = self.determine_target_state(current_state, &event)?;

        self.check_guards(current_state, target_state, &event).await?;

        self.recorder
            .record(
                self.store.as_ref(),
                self.task.task_id,
                Some(current_state),
                target_state,
                &event,
            )
            .await?;

        self.run_actions(current_state, target_state, &event).await?;

        Ok(target_state)
    }

    /// Apply a transition, treating guard and table violations as a
    /// rejection signal instead of an error. Duplicate transition requests
    /// are therefore safe: the second application is a no-op.
    pub async fn safe_transition(
        &mut self,
        event: TaskEvent,
    ) -> StateMachineResult<TransitionOutcome<TaskState>> {
        let event_type = event.event_type();
        match self.transition(event).await {
            Ok(state) => Ok(TransitionOutcome::Applied(state)),
            Err(error) if error.is_rejection() => {
                let current = self.current_state().await?;
                debug!(
                    task_id = self.task.task_id,
                    event = event_type,
                    current_state = %current,
                    reason = %error,
                    "Task transition rejected"
                );
                Ok(TransitionOutcome::Rejected {
                    current,
                    reason: error.to_string(),
                })
            }
            Err(error) => Err(error),
        }
    }

    /// Transition table: resolve the target state for (current, event)
    pub fn determine_target_state(
        &self,
        current_state: TaskState,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskState> {
        let target = match (current_state, event) {
            (TaskState::Pending, TaskEvent::Start) => TaskState::InProgress,

            (TaskState::InProgress, TaskEvent::Complete) => TaskState::Complete,

            (TaskState::InProgress, TaskEvent::Fail(_)) => TaskState::Error,
            (TaskState::Pending, TaskEvent::Fail(_)) => TaskState::Error,

            // Back to pending ahead of the next scheduled pass
            (TaskState::InProgress, TaskEvent::Reenqueue) => TaskState::Pending,

            // Manual recovery of a failed task
            (TaskState::Error, TaskEvent::Reset) => TaskState::Pending,

            (TaskState::Pending, TaskEvent::Cancel) => TaskState::Cancelled,
            (TaskState::InProgress, TaskEvent::Cancel) => TaskState::Cancelled,
            (TaskState::Error, TaskEvent::Cancel) => TaskState::Cancelled,

            (from, TaskEvent::ResolveManually) if !from.is_terminal() => {
                TaskState::ResolvedManually
            }

            (from_state, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    async fn check_guards(
        &self,
        current_state: TaskState,
        target_state: TaskState,
        event: &TaskEvent,
    ) -> StateMachineResult<()> {
        match (current_state, target_state, event) {
            (TaskState::InProgress, TaskState::Complete, TaskEvent::Complete) => {
                AllStepsCompleteGuard
                    .check(&self.task, self.store.as_ref())
                    .await?;
            }
            (TaskState::Pending, TaskState::InProgress, TaskEvent::Start) => {
                TaskNotAlreadyInProgressGuard
                    .check(&self.task, self.store.as_ref())
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn run_actions(
        &self,
        from_state: TaskState,
        to_state: TaskState,
        event: &TaskEvent,
    ) -> StateMachineResult<()> {
        let event_json = serde_json::to_string(event)?;
        let actions: Vec<Box<dyn StateAction<Task>>> = vec![
            Box::new(TraceTransitionAction),
            Box::new(PublishTransitionEventAction::new(self.publisher.clone())),
        ];
        for action in actions {
            action
                .execute(
                    &self.task,
                    Some(from_state.to_string()),
                    to_state.to_string(),
                    &event_json,
                )
                .await?;
        }
        Ok(())
    }

    /// Check if the task is in a terminal state
    pub async fn is_terminal(&self) -> StateMachineResult<bool> {
        Ok(self.current_state().await?.is_terminal())
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn task_id(&self) -> i64 {
        self.task.task_id
    }
}
