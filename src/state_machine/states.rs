use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow instance state definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Initial state when the workflow instance is created
    Pending,
    /// Orchestration is running stages
    InProgress,
    /// All stages completed successfully
    Completed,
    /// Terminal success with degraded stages (e.g. audio skipped)
    CompletedWithErrors,
    /// A fatal stage failure aborted the pipeline
    Failed,
}

impl WorkflowState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Failed
        )
    }

    /// Check if the workflow produced a usable result (full or partial)
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithErrors)
    }

    /// Check if this is an active state (stages are being processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed_with_errors"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "completed_with_errors" => Ok(Self::CompletedWithErrors),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid workflow state: {s}")),
        }
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::Pending
    }
}

/// Stage task state definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageTaskState {
    /// Initial state when the task instance is created
    Pending,
    /// Stage collaborator call is in flight
    InProgress,
    /// Stage completed successfully
    Completed,
    /// Stage failed; the orchestrator decides whether the workflow survives
    Failed,
}

impl StageTaskState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this is an active state
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl fmt::Display for StageTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for StageTaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid stage task state: {s}")),
        }
    }
}

impl Default for StageTaskState {
    fn default() -> Self {
        Self::Pending
    }
}
