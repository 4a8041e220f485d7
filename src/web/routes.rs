//! Router assembly for the orchestration API.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{health, operations, podcasts};
use super::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/podcasts", post(podcasts::create_podcast))
        .route(
            "/v1/podcasts/{task_id}/status",
            get(podcasts::get_podcast_status),
        )
        .route(
            "/v1/podcasts/{task_id}/tasks",
            get(podcasts::list_podcast_tasks),
        )
        .route("/v1/topics/discover", post(operations::discover_topics))
        .route("/v1/snippets", post(operations::craft_snippet))
        .with_state(state)
}
