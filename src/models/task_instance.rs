//! # Task Instance Model
//!
//! One row per stage execution within a workflow, ordered by `order_num`.
//! A failed task does not by itself fail the workflow; the orchestrator
//! classifies the failure first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::state_machine::StageTaskState;

/// A persisted stage execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskInstance {
    pub task_id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub order_num: i32,
    pub status: String,
    pub input_summary: serde_json::Value,
    pub output_summary: Option<serde_json::Value>,
    pub error_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskInstance {
    /// Parse the persisted status string into the typed state.
    pub fn state(&self) -> Result<StageTaskState, String> {
        self.status.parse()
    }
}
