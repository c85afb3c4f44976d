use crate::events::PublishError;
use crate::store::StoreError;

/// Errors raised while applying a state transition
#[derive(Debug, thiserror::Error)]
pub enum StateMachineError {
    /// The transition table has no edge for (current state, event)
    #[error("invalid transition from '{from}' on event '{event}'")]
    InvalidTransition { from: String, event: String },

    /// A guard condition rejected an otherwise legal transition
    #[error("transition guard rejected: {reason}")]
    GuardRejected { reason: String },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("event publishing error: {0}")]
    Event(#[from] PublishError),

    #[error("internal state machine error: {0}")]
    Internal(String),
}

impl StateMachineError {
    /// Rejections are expected under concurrent processing and are consumed
    /// as a failure signal rather than an error by `safe_transition`.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::GuardRejected { .. }
        )
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

/// Result of a `safe_transition` call: either the transition was applied and
/// the entity now sits in the new state, or it was rejected and the entity is
/// unchanged in `current`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome<S> {
    Applied(S),
    Rejected { current: S, reason: String },
}

impl<S: Copy> TransitionOutcome<S> {
    /// Whether the transition was applied
    pub fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// The entity's state after the call, applied or not
    pub fn state(&self) -> S {
        match self {
            Self::Applied(state) => *state,
            Self::Rejected { current, .. } => *current,
        }
    }
}
