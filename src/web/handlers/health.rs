//! Liveness endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::web::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    state.prune_finished();
    Json(json!({
        "status": "ok",
        "active_runs": state.active_runs(),
    }))
}
