//! Storage abstractions for the idempotency protocol and workflow tracking.
//!
//! Both stores are defined as traits so the orchestrator can run against
//! PostgreSQL in production and against the in-memory implementation in tests
//! and embedded scenarios. All writes go through single-row UPSERT/UPDATE
//! patterns; the database's row-level atomicity on `(key, task_name)` and
//! `task_id` is the only concurrency control.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{IdempotencyRecord, TaskInstance, WorkflowInstance};

pub use memory::{InMemoryIdempotencyStore, InMemoryWorkflowStore};
pub use postgres::{run_migrations, PgIdempotencyStore, PgWorkflowStore};

/// Errors raised by either store.
///
/// Storage errors are always fatal for the operation that hit them: silently
/// proceeding would break the at-most-once guarantee.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("storage backend error during {operation}: {reason}")]
    Backend { operation: String, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("storage invariant violated: {0}")]
    InvariantViolation(String),
}

impl StorageError {
    pub fn backend(operation: &str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result of an `acquire` attempt on the idempotency store.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    /// The caller now holds the PROCESSING lock and must execute the body.
    Acquired,
    /// Another attempt holds a fresh PROCESSING lock (or the record completed
    /// in the race window); the caller must back off.
    Conflict { locked_at: Option<DateTime<Utc>> },
}

/// Durable `(key, task_name)` idempotency records.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Read-only lookup of an existing record.
    async fn check(
        &self,
        key: &str,
        task_name: &str,
    ) -> Result<Option<IdempotencyRecord>, StorageError>;

    /// Insert a PROCESSING record, or re-acquire one whose status is FAILED
    /// or whose PROCESSING lock has expired. Completed records and fresh
    /// locks yield [`AcquireOutcome::Conflict`].
    async fn acquire(
        &self,
        key: &str,
        task_name: &str,
        workflow_id: Option<&str>,
    ) -> Result<AcquireOutcome, StorageError>;

    /// Mark the record COMPLETED, store the payload, clear the lock.
    async fn complete(
        &self,
        key: &str,
        task_name: &str,
        result_payload: &serde_json::Value,
    ) -> Result<(), StorageError>;

    /// Mark the record FAILED, store the error payload, clear the lock.
    async fn fail(
        &self,
        key: &str,
        task_name: &str,
        error_payload: &serde_json::Value,
    ) -> Result<(), StorageError>;

    /// The configured staleness horizon for PROCESSING locks.
    fn lock_timeout(&self) -> Duration;
}

/// Persistence for workflow instances and their stage task rows.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create_workflow(
        &self,
        context_data: serde_json::Value,
    ) -> Result<WorkflowInstance, StorageError>;

    async fn get_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<Option<WorkflowInstance>, StorageError>;

    /// Update workflow status; `context_data` and `error_message` are merged
    /// only when provided.
    async fn update_workflow_status(
        &self,
        workflow_id: Uuid,
        status: &str,
        context_data: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> Result<(), StorageError>;

    async fn create_task(
        &self,
        workflow_id: Uuid,
        name: &str,
        order_num: i32,
        input_summary: serde_json::Value,
    ) -> Result<TaskInstance, StorageError>;

    async fn get_task(&self, task_id: Uuid) -> Result<Option<TaskInstance>, StorageError>;

    async fn update_task_status(
        &self,
        task_id: Uuid,
        status: &str,
        output_summary: Option<serde_json::Value>,
        error_details: Option<serde_json::Value>,
    ) -> Result<(), StorageError>;

    /// All task instances for a workflow, ordered by `order_num`.
    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<TaskInstance>, StorageError>;
}
