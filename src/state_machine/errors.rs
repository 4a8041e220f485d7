use thiserror::Error;

/// Errors raised while evaluating workflow or stage-task transitions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateMachineError {
    /// The requested transition is not part of the state machine.
    #[error("invalid transition from {from:?} on event {event}")]
    InvalidTransition { from: String, event: String },

    /// A state string read from the store could not be parsed.
    #[error("internal state machine error: {0}")]
    Internal(String),
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
