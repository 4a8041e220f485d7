//! In-memory store implementations.
//!
//! Used by the test suite and by embedded deployments that do not need
//! durability. Semantics mirror the PostgreSQL implementation row for row,
//! including the acquire UPSERT conditions.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use super::{AcquireOutcome, IdempotencyStore, StorageError, WorkflowStore};
use crate::models::{IdempotencyRecord, IdempotencyStatus, TaskInstance, WorkflowInstance};
use crate::state_machine::{StageTaskState, WorkflowState};

/// Hash-map backed idempotency store guarded by a single mutex.
pub struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<(String, String), IdempotencyRecord>>,
    lock_timeout: Duration,
}

impl InMemoryIdempotencyStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Insert a record directly, bypassing the protocol. Test seam for
    /// constructing stale-lock and conflict scenarios.
    pub fn seed(&self, record: IdempotencyRecord) {
        self.records
            .lock()
            .insert((record.key.clone(), record.task_name.clone()), record);
    }

    /// Snapshot a record for assertions.
    pub fn snapshot(&self, key: &str, task_name: &str) -> Option<IdempotencyRecord> {
        self.records
            .lock()
            .get(&(key.to_string(), task_name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn check(
        &self,
        key: &str,
        task_name: &str,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        Ok(self
            .records
            .lock()
            .get(&(key.to_string(), task_name.to_string()))
            .cloned())
    }

    async fn acquire(
        &self,
        key: &str,
        task_name: &str,
        workflow_id: Option<&str>,
    ) -> Result<AcquireOutcome, StorageError> {
        let mut records = self.records.lock();
        let map_key = (key.to_string(), task_name.to_string());

        if let Some(existing) = records.get(&map_key) {
            let status = existing
                .parsed_status()
                .map_err(StorageError::InvariantViolation)?;
            let reacquirable = match status {
                IdempotencyStatus::Failed => true,
                IdempotencyStatus::Processing => existing.is_lock_expired(self.lock_timeout),
                IdempotencyStatus::Completed => false,
            };
            if !reacquirable {
                return Ok(AcquireOutcome::Conflict {
                    locked_at: existing.locked_at,
                });
            }
        }

        let now = Utc::now();
        let created_at = records.get(&map_key).map(|r| r.created_at).unwrap_or(now);
        records.insert(
            map_key,
            IdempotencyRecord {
                key: key.to_string(),
                task_name: task_name.to_string(),
                workflow_id: workflow_id.map(str::to_string),
                status: IdempotencyStatus::Processing.to_string(),
                locked_at: Some(now),
                result_payload: None,
                error_payload: None,
                created_at,
            },
        );
        Ok(AcquireOutcome::Acquired)
    }

    async fn complete(
        &self,
        key: &str,
        task_name: &str,
        result_payload: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(&(key.to_string(), task_name.to_string()))
            .ok_or_else(|| StorageError::NotFound {
                entity: "idempotency record".to_string(),
                id: format!("{key}/{task_name}"),
            })?;
        record.status = IdempotencyStatus::Completed.to_string();
        record.result_payload = Some(result_payload.clone());
        record.locked_at = None;
        Ok(())
    }

    async fn fail(
        &self,
        key: &str,
        task_name: &str,
        error_payload: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(&(key.to_string(), task_name.to_string()))
            .ok_or_else(|| StorageError::NotFound {
                entity: "idempotency record".to_string(),
                id: format!("{key}/{task_name}"),
            })?;
        record.status = IdempotencyStatus::Failed.to_string();
        record.error_payload = Some(error_payload.clone());
        record.locked_at = None;
        Ok(())
    }

    fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

/// Hash-map backed workflow/task store.
pub struct InMemoryWorkflowStore {
    workflows: Mutex<HashMap<Uuid, WorkflowInstance>>,
    tasks: Mutex<HashMap<Uuid, TaskInstance>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self {
            workflows: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_workflow(
        &self,
        context_data: serde_json::Value,
    ) -> Result<WorkflowInstance, StorageError> {
        let now = Utc::now();
        let workflow = WorkflowInstance {
            workflow_id: Uuid::new_v4(),
            status: WorkflowState::Pending.to_string(),
            context_data,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.workflows
            .lock()
            .insert(workflow.workflow_id, workflow.clone());
        Ok(workflow)
    }

    async fn get_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<Option<WorkflowInstance>, StorageError> {
        Ok(self.workflows.lock().get(&workflow_id).cloned())
    }

    async fn update_workflow_status(
        &self,
        workflow_id: Uuid,
        status: &str,
        context_data: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        let mut workflows = self.workflows.lock();
        let workflow = workflows
            .get_mut(&workflow_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "workflow".to_string(),
                id: workflow_id.to_string(),
            })?;
        workflow.status = status.to_string();
        if let Some(context) = context_data {
            workflow.context_data = context;
        }
        if let Some(message) = error_message {
            workflow.error_message = Some(message);
        }
        workflow.updated_at = Utc::now();
        Ok(())
    }

    async fn create_task(
        &self,
        workflow_id: Uuid,
        name: &str,
        order_num: i32,
        input_summary: serde_json::Value,
    ) -> Result<TaskInstance, StorageError> {
        let now = Utc::now();
        let task = TaskInstance {
            task_id: Uuid::new_v4(),
            workflow_id,
            name: name.to_string(),
            order_num,
            status: StageTaskState::Pending.to_string(),
            input_summary,
            output_summary: None,
            error_details: None,
            created_at: now,
            updated_at: now,
        };
        self.tasks.lock().insert(task.task_id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<TaskInstance>, StorageError> {
        Ok(self.tasks.lock().get(&task_id).cloned())
    }

    async fn update_task_status(
        &self,
        task_id: Uuid,
        status: &str,
        output_summary: Option<serde_json::Value>,
        error_details: Option<serde_json::Value>,
    ) -> Result<(), StorageError> {
        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(&task_id).ok_or_else(|| StorageError::NotFound {
            entity: "task".to_string(),
            id: task_id.to_string(),
        })?;
        task.status = status.to_string();
        if let Some(summary) = output_summary {
            task.output_summary = Some(summary);
        }
        if let Some(details) = error_details {
            task.error_details = Some(details);
        }
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<TaskInstance>, StorageError> {
        let mut tasks: Vec<TaskInstance> = self
            .tasks
            .lock()
            .values()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.order_num);
        Ok(tasks)
    }
}
