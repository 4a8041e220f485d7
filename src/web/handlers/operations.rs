//! Auxiliary collaborator operations: topic discovery and snippet crafting.
//!
//! These endpoints call paid external services, so the idempotency key header
//! is a hard requirement rather than generated server-side.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::constants::headers as header_names;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TopicDiscoveryRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct SnippetRequest {
    pub topic: String,
    #[serde(default)]
    pub script_id: Option<String>,
}

fn require_idempotency_key(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(header_names::IDEMPOTENCY_KEY)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "{} header is required",
                header_names::IDEMPOTENCY_KEY
            ))
        })
}

/// Discover candidate topics: `POST /v1/topics/discover`.
pub async fn discover_topics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TopicDiscoveryRequest>,
) -> ApiResult<Json<Value>> {
    let key = require_idempotency_key(&headers)?;
    let result = state
        .orchestrator
        .discover_topics(&request.query, &key)
        .await?;
    Ok(Json(result))
}

/// Craft a promotional snippet: `POST /v1/snippets`.
pub async fn craft_snippet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SnippetRequest>,
) -> ApiResult<Json<Value>> {
    let key = require_idempotency_key(&headers)?;
    let result = state
        .orchestrator
        .craft_snippet(&request.topic, request.script_id.as_deref(), &key)
        .await?;
    Ok(Json(result))
}
