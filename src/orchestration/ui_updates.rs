//! Best-effort UI update channel.
//!
//! One update is emitted per stage transition and one terminal update at the
//! end of every run. Delivery failures are logged by the orchestrator and
//! never abort orchestration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use super::errors::{OrchestrationError, OrchestrationResult};

/// A single UI push event.
#[derive(Debug, Clone, Serialize)]
pub struct UiUpdate {
    pub workflow_id: Uuid,
    /// `task_update` for normal transitions, `task_error` for fatal failures.
    pub event: String,
    pub stage: Option<String>,
    pub status: String,
    pub message: String,
    pub is_terminal: bool,
    pub timestamp: DateTime<Utc>,
}

impl UiUpdate {
    pub fn stage_update(
        workflow_id: Uuid,
        stage: &str,
        status: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id,
            event: "task_update".to_string(),
            stage: Some(stage.to_string()),
            status: status.to_string(),
            message: message.into(),
            is_terminal: false,
            timestamp: Utc::now(),
        }
    }

    pub fn stage_error(
        workflow_id: Uuid,
        stage: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id,
            event: "task_error".to_string(),
            stage: Some(stage.to_string()),
            status: "failed".to_string(),
            message: message.into(),
            is_terminal: false,
            timestamp: Utc::now(),
        }
    }

    pub fn terminal(workflow_id: Uuid, status: &str, message: impl Into<String>) -> Self {
        Self {
            workflow_id,
            event: "task_update".to_string(),
            stage: None,
            status: status.to_string(),
            message: message.into(),
            is_terminal: true,
            timestamp: Utc::now(),
        }
    }
}

/// Fire-and-forget delivery of UI updates.
#[async_trait]
pub trait UiUpdateSender: Send + Sync {
    async fn send(&self, update: &UiUpdate) -> OrchestrationResult<()>;
}

/// Pushes updates to an HTTP endpoint with a short timeout.
pub struct HttpUiUpdateSender {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpUiUpdateSender {
    pub fn new(endpoint: String) -> OrchestrationResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| OrchestrationError::Configuration {
                config_source: "ui_updates".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl UiUpdateSender for HttpUiUpdateSender {
    async fn send(&self, update: &UiUpdate) -> OrchestrationResult<()> {
        self.http
            .post(&self.endpoint)
            .json(update)
            .send()
            .await
            .map_err(|e| OrchestrationError::CollaboratorUnavailable {
                url: self.endpoint.clone(),
                attempts: 1,
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// Drops updates; used when no UI channel is configured and in tests.
pub struct NullUiUpdateSender;

#[async_trait]
impl UiUpdateSender for NullUiUpdateSender {
    async fn send(&self, _update: &UiUpdate) -> OrchestrationResult<()> {
        Ok(())
    }
}
