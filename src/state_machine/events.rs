use serde::{Deserialize, Serialize};
use std::fmt;

/// Events that drive workflow instance transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Begin stage execution
    Start,
    /// All stages succeeded
    Complete,
    /// Terminal success with degraded stages
    CompleteWithWarnings,
    /// Fatal stage failure with a human-readable message
    Fail(String),
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Complete => write!(f, "complete"),
            Self::CompleteWithWarnings => write!(f, "complete_with_warnings"),
            Self::Fail(_) => write!(f, "fail"),
        }
    }
}

/// Events that drive stage task transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageTaskEvent {
    /// Collaborator call is being issued
    Start,
    /// Stage produced a usable result
    Complete,
    /// Stage failed with a human-readable message
    Fail(String),
}

impl fmt::Display for StageTaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Complete => write!(f, "complete"),
            Self::Fail(_) => write!(f, "fail"),
        }
    }
}
