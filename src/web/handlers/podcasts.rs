//! # Podcast Generation Handlers
//!
//! Submit endpoint (202 + status URL) and status/tasks retrieval. The submit
//! handler spawns the orchestration run and returns immediately; callers poll
//! the status URL until the workflow is terminal.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::constants::headers as header_names;
use crate::models::TaskInstance;
use crate::orchestration::types::PodcastRequest;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct PodcastSubmitResponse {
    pub task_id: Uuid,
    pub status_url: String,
}

#[derive(Debug, Serialize)]
pub struct PodcastStatusResponse {
    pub task_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Create a podcast generation workflow: `POST /v1/podcasts`.
///
/// An `X-Idempotency-Key` header scopes the run; one is generated when the
/// caller does not supply it (internal stage calls always derive theirs from
/// this parent key).
pub async fn create_podcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PodcastRequest>,
) -> ApiResult<impl IntoResponse> {
    let idempotency_key = headers
        .get(header_names::IDEMPOTENCY_KEY)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let workflow = state.orchestrator.create_workflow_instance(&request).await?;
    let workflow_id = workflow.workflow_id;
    info!(
        workflow_id = %workflow_id,
        topic = %request.topic,
        "accepted podcast generation request"
    );

    let orchestrator = state.orchestrator.clone();
    let handle = tokio::spawn(async move {
        if let Err(run_error) = orchestrator
            .run(workflow_id, request, &idempotency_key)
            .await
        {
            error!(
                workflow_id = %workflow_id,
                error = %run_error,
                "orchestration run aborted"
            );
        }
    });
    state.track_run(workflow_id, handle);

    Ok((
        StatusCode::ACCEPTED,
        Json(PodcastSubmitResponse {
            task_id: workflow_id,
            status_url: format!("/v1/podcasts/{workflow_id}/status"),
        }),
    ))
}

/// Poll workflow status: `GET /v1/podcasts/{task_id}/status`.
///
/// `result` is present once the workflow reaches a terminal state.
pub async fn get_podcast_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<PodcastStatusResponse>> {
    state.prune_finished();
    let workflow = state
        .workflow_store()
        .get_workflow(task_id)
        .await
        .map_err(|e| ApiError::from(crate::orchestration::errors::OrchestrationError::from(e)))?
        .ok_or_else(|| ApiError::not_found(format!("workflow {task_id} not found")))?;

    let result = if workflow.is_terminal() {
        workflow.result().cloned()
    } else {
        None
    };

    Ok(Json(PodcastStatusResponse {
        task_id,
        status: workflow.status.clone(),
        result,
        error_message: workflow.error_message.clone(),
    }))
}

/// List a workflow's stage task records: `GET /v1/podcasts/{task_id}/tasks`.
pub async fn list_podcast_tasks(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TaskInstance>>> {
    let store = state.workflow_store();
    let workflow = store
        .get_workflow(task_id)
        .await
        .map_err(|e| ApiError::from(crate::orchestration::errors::OrchestrationError::from(e)))?
        .ok_or_else(|| ApiError::not_found(format!("workflow {task_id} not found")))?;

    let tasks = store
        .list_tasks(workflow.workflow_id)
        .await
        .map_err(|e| ApiError::from(crate::orchestration::errors::OrchestrationError::from(e)))?;
    Ok(Json(tasks))
}
