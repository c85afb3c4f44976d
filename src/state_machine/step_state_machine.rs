use std::sync::Arc;
use tracing::debug;

use super::actions::{PublishTransitionEventAction, StateAction, TraceTransitionAction};
use super::errors::{StateMachineError, StateMachineResult, TransitionOutcome};
use super::events::StepEvent;
use super::guards::{
    StepDependenciesMetGuard, StepNotAlreadyInProgressGuard, StepRetryEligibleGuard,
    TransitionGuard,
};
use super::persistence::StepTransitionRecorder;
use super::states::WorkflowStepState;
use crate::events::EventPublisher;
use crate::models::WorkflowStep;
use crate::store::WorkflowStore;

/// Guarded workflow step state machine.
///
/// The retry edge is `(error, start) -> in_progress`, guarded by retry
/// eligibility, so the executor drives fresh and retrying steps through the
/// same event.
pub struct StepStateMachine {
    step: WorkflowStep,
    store: Arc<dyn WorkflowStore>,
    publisher: EventPublisher,
    recorder: StepTransitionRecorder,
}

impl StepStateMachine {
    pub fn new(
        step: WorkflowStep,
        store: Arc<dyn WorkflowStore>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            step,
            store,
            publisher,
            recorder: StepTransitionRecorder,
        }
    }

    /// Current state from the transition log; default state when the log is empty
    pub async fn current_state(&self) -> StateMachineResult<WorkflowStepState> {
        Ok(self
            .store
            .current_step_state(self.step.workflow_step_id)
            .await?
            .unwrap_or_default())
    }

    /// Apply a transition. Guard and table violations are errors here; use
    /// [`safe_transition`](Self::safe_transition) where rejection is an
    /// expected outcome.
    pub async fn transition(&mut self, event: StepEvent) -> StateMachineResult<WorkflowStepState> {
        let current_state = self.current_state().await?;
        let target_state = self.determine_target_state(current_state, &event)?;

        self.check_guards(current_state, target_state, &event).await?;

        self.recorder
            .record(
                self.store.as_ref(),
                self.step.workflow_step_id,
                Some(current_state),
                target_state,
                &event,
            )
            .await?;

        self.run_actions(current_state, target_state, &event).await?;

        Ok(target_state)
    }

    /// Apply a transition, treating guard and table violations as a
    /// rejection signal instead of an error.
    pub async fn safe_transition(
        &mut self,
        event: StepEvent,
    ) -> StateMachineResult<TransitionOutcome<WorkflowStepState>> {
        let event_type = event.event_type();
        match self.transition(event).await {
            Ok(state) => Ok(TransitionOutcome::Applied(state)),
            Err(error) if error.is_rejection() => {
                let current = self.current_state().await?;
                debug!(
                    task_id = self.step.task_id,
                    step_id = self.step.workflow_step_id,
                    event = event_type,
                    current_state = %current,
                    reason = %error,
                    "Step transition rejected"
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
        current_state: WorkflowStepState,
        event: &StepEvent,
    ) -> StateMachineResult<WorkflowStepState> {
        let target = match (current_state, event) {
            (WorkflowStepState::Pending, StepEvent::Start) => WorkflowStepState::InProgress,

            // Retry: back into execution while retry-eligible
            (WorkflowStepState::Error, StepEvent::Start) => WorkflowStepState::InProgress,

            (WorkflowStepState::InProgress, StepEvent::Complete(_)) => WorkflowStepState::Complete,

            (WorkflowStepState::InProgress, StepEvent::Fail(_)) => WorkflowStepState::Error,
            (WorkflowStepState::Pending, StepEvent::Fail(_)) => WorkflowStepState::Error,

            (WorkflowStepState::Pending, StepEvent::Cancel) => WorkflowStepState::Cancelled,
            (WorkflowStepState::InProgress, StepEvent::Cancel) => WorkflowStepState::Cancelled,
            (WorkflowStepState::Error, StepEvent::Cancel) => WorkflowStepState::Cancelled,

            (from, StepEvent::ResolveManually) if !from.is_terminal() => {
                WorkflowStepState::ResolvedManually
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
        current_state: WorkflowStepState,
        target_state: WorkflowStepState,
        event: &StepEvent,
    ) -> StateMachineResult<()> {
        match (current_state, target_state, event) {
            (WorkflowStepState::Pending, WorkflowStepState::InProgress, StepEvent::Start) => {
                StepDependenciesMetGuard
                    .check(&self.step, self.store.as_ref())
                    .await?;
                StepNotAlreadyInProgressGuard
                    .check(&self.step, self.store.as_ref())
                    .await?;
            }
            (WorkflowStepState::Error, WorkflowStepState::InProgress, StepEvent::Start) => {
                StepRetryEligibleGuard
                    .check(&self.step, self.store.as_ref())
                    .await?;
                StepDependenciesMetGuard
                    .check(&self.step, self.store.as_ref())
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn run_actions(
        &self,
        from_state: WorkflowStepState,
        to_state: WorkflowStepState,
        event: &StepEvent,
    ) -> StateMachineResult<()> {
        let event_json = serde_json::to_string(event)?;
        let actions: Vec<Box<dyn StateAction<WorkflowStep>>> = vec![
            Box::new(TraceTransitionAction),
            Box::new(PublishTransitionEventAction::new(self.publisher.clone())),
        ];
        for action in actions {
            action
                .execute(
                    &self.step,
                    Some(from_state.to_string()),
                    to_state.to_string(),
                    &event_json,
                )
                .await?;
        }
        Ok(())
    }

    /// Check if the step is in a terminal state
    pub async fn is_terminal(&self) -> StateMachineResult<bool> {
        Ok(self.current_state().await?.is_terminal())
    }

    /// Check if the step currently satisfies dependencies for its children
    pub async fn satisfies_dependencies(&self) -> StateMachineResult<bool> {
        Ok(self.current_state().await?.satisfies_dependencies())
    }

    pub fn step(&self) -> &WorkflowStep {
        &self.step
    }

    pub fn step_id(&self) -> i64 {
        self.step.workflow_step_id
    }

    pub fn task_id(&self) -> i64 {
        self.step.task_id
    }
}
