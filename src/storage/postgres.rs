//! PostgreSQL store implementations.
//!
//! The acquire path is a single-row UPSERT whose `WHERE` clause encodes the
//! re-acquisition rules; `rows_affected` tells us whether we won the lock.
//! This is the hard backstop against the narrow check-then-acquire race.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use super::{AcquireOutcome, IdempotencyStore, StorageError, WorkflowStore};
use crate::models::{IdempotencyRecord, TaskInstance, WorkflowInstance};
use crate::state_machine::{StageTaskState, WorkflowState};

/// Create the orchestration tables if they do not exist.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS idempotency_keys (
            key TEXT NOT NULL,
            task_name TEXT NOT NULL,
            workflow_id TEXT NULL,
            status TEXT NOT NULL,
            locked_at TIMESTAMPTZ NULL,
            result_payload JSONB NULL,
            error_payload JSONB NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (key, task_name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS workflow_instance (
            workflow_id UUID PRIMARY KEY,
            status TEXT NOT NULL,
            context_data JSONB NOT NULL DEFAULT '{}'::jsonb,
            error_message TEXT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS task_instance (
            task_id UUID PRIMARY KEY,
            workflow_id UUID NOT NULL REFERENCES workflow_instance(workflow_id),
            name TEXT NOT NULL,
            order_num INTEGER NOT NULL,
            status TEXT NOT NULL,
            input_summary JSONB NOT NULL DEFAULT '{}'::jsonb,
            output_summary JSONB NULL,
            error_details JSONB NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_task_instance_workflow
            ON task_instance (workflow_id, order_num)
        "#,
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StorageError::backend("run_migrations", e))?;
    }
    Ok(())
}

/// PostgreSQL-backed idempotency store.
#[derive(Clone)]
pub struct PgIdempotencyStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgIdempotencyStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn check(
        &self,
        key: &str,
        task_name: &str,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            SELECT key, task_name, workflow_id, status, locked_at,
                   result_payload, error_payload, created_at
            FROM idempotency_keys
            WHERE key = $1 AND task_name = $2
            "#,
        )
        .bind(key)
        .bind(task_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::backend("idempotency_check", e))
    }

    async fn acquire(
        &self,
        key: &str,
        task_name: &str,
        workflow_id: Option<&str>,
    ) -> Result<AcquireOutcome, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys
                (key, task_name, workflow_id, status, locked_at, created_at)
            VALUES ($1, $2, $3, 'processing', NOW(), NOW())
            ON CONFLICT (key, task_name) DO UPDATE
            SET status = 'processing',
                locked_at = NOW(),
                workflow_id = EXCLUDED.workflow_id,
                result_payload = NULL,
                error_payload = NULL
            WHERE idempotency_keys.status = 'failed'
               OR (idempotency_keys.status = 'processing'
                   AND idempotency_keys.locked_at < NOW() - ($4 * INTERVAL '1 second'))
            "#,
        )
        .bind(key)
        .bind(task_name)
        .bind(workflow_id)
        .bind(self.lock_timeout.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::backend("idempotency_acquire", e))?;

        if result.rows_affected() == 1 {
            return Ok(AcquireOutcome::Acquired);
        }

        // Lost the upsert: report the holder's lock timestamp for diagnostics.
        let holder = self.check(key, task_name).await?;
        Ok(AcquireOutcome::Conflict {
            locked_at: holder.and_then(|r| r.locked_at),
        })
    }

    async fn complete(
        &self,
        key: &str,
        task_name: &str,
        result_payload: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET status = 'completed', result_payload = $3, locked_at = NULL
            WHERE key = $1 AND task_name = $2
            "#,
        )
        .bind(key)
        .bind(task_name)
        .bind(result_payload)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::backend("idempotency_complete", e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "idempotency record".to_string(),
                id: format!("{key}/{task_name}"),
            });
        }
        Ok(())
    }

    async fn fail(
        &self,
        key: &str,
        task_name: &str,
        error_payload: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET status = 'failed', error_payload = $3, locked_at = NULL
            WHERE key = $1 AND task_name = $2
            "#,
        )
        .bind(key)
        .bind(task_name)
        .bind(error_payload)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::backend("idempotency_fail", e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "idempotency record".to_string(),
                id: format!("{key}/{task_name}"),
            });
        }
        Ok(())
    }

    fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

/// PostgreSQL-backed workflow/task store.
#[derive(Clone)]
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn create_workflow(
        &self,
        context_data: serde_json::Value,
    ) -> Result<WorkflowInstance, StorageError> {
        sqlx::query_as::<_, WorkflowInstance>(
            r#"
            INSERT INTO workflow_instance
                (workflow_id, status, context_data, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            RETURNING workflow_id, status, context_data, error_message,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(WorkflowState::Pending.to_string())
        .bind(context_data)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::backend("create_workflow", e))
    }

    async fn get_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<Option<WorkflowInstance>, StorageError> {
        sqlx::query_as::<_, WorkflowInstance>(
            r#"
            SELECT workflow_id, status, context_data, error_message,
                   created_at, updated_at
            FROM workflow_instance
            WHERE workflow_id = $1
            "#,
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::backend("get_workflow", e))
    }

    async fn update_workflow_status(
        &self,
        workflow_id: Uuid,
        status: &str,
        context_data: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_instance
            SET status = $2,
                context_data = COALESCE($3, context_data),
                error_message = COALESCE($4, error_message),
                updated_at = NOW()
            WHERE workflow_id = $1
            "#,
        )
        .bind(workflow_id)
        .bind(status)
        .bind(context_data)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::backend("update_workflow_status", e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "workflow".to_string(),
                id: workflow_id.to_string(),
            });
        }
        Ok(())
    }

    async fn create_task(
        &self,
        workflow_id: Uuid,
        name: &str,
        order_num: i32,
        input_summary: serde_json::Value,
    ) -> Result<TaskInstance, StorageError> {
        sqlx::query_as::<_, TaskInstance>(
            r#"
            INSERT INTO task_instance
                (task_id, workflow_id, name, order_num, status, input_summary,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING task_id, workflow_id, name, order_num, status,
                      input_summary, output_summary, error_details,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workflow_id)
        .bind(name)
        .bind(order_num)
        .bind(StageTaskState::Pending.to_string())
        .bind(input_summary)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::backend("create_task", e))
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<TaskInstance>, StorageError> {
        sqlx::query_as::<_, TaskInstance>(
            r#"
            SELECT task_id, workflow_id, name, order_num, status,
                   input_summary, output_summary, error_details,
                   created_at, updated_at
            FROM task_instance
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::backend("get_task", e))
    }

    async fn update_task_status(
        &self,
        task_id: Uuid,
        status: &str,
        output_summary: Option<serde_json::Value>,
        error_details: Option<serde_json::Value>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE task_instance
            SET status = $2,
                output_summary = COALESCE($3, output_summary),
                error_details = COALESCE($4, error_details),
                updated_at = NOW()
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(status)
        .bind(output_summary)
        .bind(error_details)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::backend("update_task_status", e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "task".to_string(),
                id: task_id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<TaskInstance>, StorageError> {
        sqlx::query_as::<_, TaskInstance>(
            r#"
            SELECT task_id, workflow_id, name, order_num, status,
                   input_summary, output_summary, error_details,
                   created_at, updated_at
            FROM task_instance
            WHERE workflow_id = $1
            ORDER BY order_num ASC
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::backend("list_tasks", e))
    }
}
