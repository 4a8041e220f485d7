//! # Orchestration Errors
//!
//! The closed error taxonomy for the orchestration core. Callers inspect
//! variants (and the typed `LogicalErrorKind`) instead of parsing formatted
//! messages; the human-readable `Display` output is only for logs and the
//! workflow `error_message` column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::state_machine::StateMachineError;
use crate::storage::StorageError;

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// How a collaborator reported a logical (non-transport) problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalErrorKind {
    /// The collaborator ran and reported a hard error in its payload.
    Error,
    /// The collaborator declined the work (e.g. script below minimum length).
    Skipped,
    /// The payload was structurally invalid for the stage contract.
    Malformed,
}

impl fmt::Display for LogicalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Skipped => write!(f, "skipped"),
            Self::Malformed => write!(f, "malformed"),
        }
    }
}

/// Errors raised anywhere inside the orchestration core.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Required connection or credential configuration is missing or invalid.
    #[error("configuration error for {config_source}: {reason}")]
    Configuration {
        config_source: String,
        reason: String,
    },

    /// Malformed or missing request fields; never retried.
    #[error("validation error for field {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Every side-effecting entry point requires an idempotency key.
    #[error("idempotency key required for task {task_name}")]
    MissingIdempotencyKey { task_name: String },

    /// A concurrent or duplicate in-flight attempt holds the key.
    #[error("operation for key {key} and task {task_name} is already in progress")]
    IdempotencyConflict {
        key: String,
        task_name: String,
        locked_at: Option<DateTime<Utc>>,
    },

    /// Transport-level failure talking to a stage collaborator, after retries.
    #[error("collaborator at {url} unavailable after {attempts} attempts: {reason}")]
    CollaboratorUnavailable {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Collaborator answered with an unexpected HTTP status.
    #[error("collaborator request to {url} failed with status {status}: {body}")]
    CollaboratorRequest {
        url: String,
        status: u16,
        body: String,
    },

    /// Collaborator answered at the transport layer but reported a logical
    /// error, skip, or structurally invalid payload.
    #[error("collaborator reported a {kind} result: {message}")]
    CollaboratorLogical {
        kind: LogicalErrorKind,
        message: String,
        detail: serde_json::Value,
    },

    /// Collaborator never reached a terminal state within the poll budget.
    #[error("collaborator task {remote_task_id} did not reach a terminal state within {timeout:?}")]
    PollingTimeout {
        remote_task_id: String,
        timeout: Duration,
    },

    /// Idempotency/workflow store failure; always fatal for the operation.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A workflow or task transition outside the legal state graph.
    #[error(transparent)]
    StateTransition(#[from] StateMachineError),
}

impl OrchestrationError {
    /// Stable machine-readable tag for error payloads and API bodies.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::Validation { .. } => "validation_error",
            Self::MissingIdempotencyKey { .. } => "missing_idempotency_key",
            Self::IdempotencyConflict { .. } => "idempotency_conflict",
            Self::CollaboratorUnavailable { .. } => "collaborator_unavailable",
            Self::CollaboratorRequest { .. } => "collaborator_request_error",
            Self::CollaboratorLogical { .. } => "collaborator_logical_error",
            Self::PollingTimeout { .. } => "polling_timeout",
            Self::Storage(_) => "storage_error",
            Self::StateTransition(_) => "state_transition_error",
        }
    }

    /// Storage errors must propagate instead of being folded into a terminal
    /// workflow status; the at-most-once guarantee may be compromised.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Structured payload stored on FAILED idempotency records.
    pub fn to_error_payload(&self) -> serde_json::Value {
        json!({
            "error_type": self.error_type(),
            "message": self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_payload_shape() {
        let err = OrchestrationError::PollingTimeout {
            remote_task_id: "tts-42".to_string(),
            timeout: Duration::from_millis(10),
        };
        let payload = err.to_error_payload();
        assert_eq!(payload["error_type"], "polling_timeout");
        assert!(payload["message"].as_str().unwrap().contains("tts-42"));
    }

    #[test]
    fn test_storage_errors_are_transparent() {
        let err: OrchestrationError = StorageError::backend("check", "connection refused").into();
        assert_eq!(err.error_type(), "storage_error");
        assert!(err.to_string().contains("connection refused"));
    }
}
