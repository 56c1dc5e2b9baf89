use crate::state_machine::{SettlementEvent, SettlementState};

/// Core domain errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("invalid state transition: {event:?} is not allowed from {from}")]
    InvalidStateTransition {
        from: SettlementState,
        event: SettlementEvent,
    },

    #[error("payment request validation failed: {0}")]
    ValidationError(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid settlement config: {0}")]
    InvalidConfig(String),
}
