//! # Workflow/Task State Tracker
//!
//! Thin layer over the [`WorkflowStore`] that validates every transition
//! against the state machines before persisting it. The orchestrator never
//! writes workflow or task status directly.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use super::errors::{OrchestrationResult};
use crate::logging::log_workflow_transition;
use crate::models::{TaskInstance, WorkflowInstance};
use crate::state_machine::{
    stage_task_target_state, workflow_target_state, StageTaskEvent, StageTaskState,
    StateMachineError, WorkflowEvent, WorkflowState,
};
use crate::storage::{StorageError, WorkflowStore};

#[derive(Clone)]
pub struct WorkflowTracker {
    store: Arc<dyn WorkflowStore>,
}

impl WorkflowTracker {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Create a workflow instance in its initial state.
    pub async fn create_workflow(
        &self,
        context_data: Value,
    ) -> OrchestrationResult<WorkflowInstance> {
        let workflow = self.store.create_workflow(context_data).await?;
        log_workflow_transition(workflow.workflow_id, None, &workflow.status, "created");
        Ok(workflow)
    }

    /// Apply a workflow event, persisting the validated target state.
    ///
    /// `Fail` events carry the error message stored on the instance.
    pub async fn transition_workflow(
        &self,
        workflow_id: Uuid,
        event: WorkflowEvent,
        context_data: Option<Value>,
    ) -> OrchestrationResult<WorkflowState> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: "workflow".to_string(),
                id: workflow_id.to_string(),
            })?;

        let current: WorkflowState = workflow
            .status
            .parse()
            .map_err(StateMachineError::Internal)?;
        let target = workflow_target_state(current, &event)?;

        let error_message = match &event {
            WorkflowEvent::Fail(message) => Some(message.clone()),
            _ => None,
        };

        self.store
            .update_workflow_status(workflow_id, &target.to_string(), context_data, error_message)
            .await?;
        log_workflow_transition(
            workflow_id,
            Some(&current.to_string()),
            &target.to_string(),
            &event.to_string(),
        );
        Ok(target)
    }

    /// Create a stage task record in its initial state.
    pub async fn create_task(
        &self,
        workflow_id: Uuid,
        name: &str,
        order_num: i32,
        input_summary: Value,
    ) -> OrchestrationResult<TaskInstance> {
        let task = self
            .store
            .create_task(workflow_id, name, order_num, input_summary)
            .await?;
        Ok(task)
    }

    /// Apply a stage task event, persisting the validated target state.
    pub async fn transition_task(
        &self,
        task_id: Uuid,
        event: StageTaskEvent,
        output_summary: Option<Value>,
        error_details: Option<Value>,
    ) -> OrchestrationResult<StageTaskState> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: "task".to_string(),
                id: task_id.to_string(),
            })?;

        let current: StageTaskState = task.status.parse().map_err(StateMachineError::Internal)?;
        let target = stage_task_target_state(current, &event)?;

        self.store
            .update_task_status(task_id, &target.to_string(), output_summary, error_details)
            .await?;
        Ok(target)
    }
}
