//! # Workflow Instance Model
//!
//! One row per top-level orchestration request. The instance owns the
//! request context, the terminal status, and (once terminal) the structured
//! result payload inside `context_data`.
//!
//! ## Database Schema
//!
//! Maps to the `workflow_instance` table:
//! - `workflow_id`: Primary key (UUID, generated on creation)
//! - `status`: Current state machine state (TEXT)
//! - `context_data`: JSONB request context and final result
//! - `error_message`: Populated when the workflow fails

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::state_machine::WorkflowState;

/// A persisted top-level orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowInstance {
    pub workflow_id: Uuid,
    pub status: String,
    pub context_data: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// Parse the persisted status string into the typed state.
    pub fn state(&self) -> Result<WorkflowState, String> {
        self.status.parse()
    }

    /// Whether the workflow has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state().map(|s| s.is_terminal()).unwrap_or(false)
    }

    /// The structured result recorded at finalization, if any.
    pub fn result(&self) -> Option<&serde_json::Value> {
        match self.context_data.get("result") {
            Some(serde_json::Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }
}
