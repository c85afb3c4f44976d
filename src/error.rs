//! Top-level error umbrella.
//!
//! Components carry their own error enums; this type folds them together
//! for callers that drive whole passes (coordinator, host wiring).

use crate::events::PublishError;
use crate::models::TemplateError;
use crate::orchestration::{
    DiscoveryError, ExecutionError, FinalizationError, InitializationError, ReenqueueError,
};
use crate::registry::RegistryError;
use crate::state_machine::StateMachineError;
use crate::store::StoreError;

/// Any failure surfaced by the orchestration engine
#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Finalization(#[from] FinalizationError),

    #[error(transparent)]
    Reenqueue(#[from] ReenqueueError),

    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Event(#[from] PublishError),

    #[error("configuration error: {0}")]
    Configuration(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, CascadeError>;
