//! Orchestration API server: configuration, database pool, migrations,
//! and the axum listener.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use podcast_core::client::AsyncCollaboratorClient;
use podcast_core::config::OrchestratorConfig;
use podcast_core::logging::init_structured_logging;
use podcast_core::orchestration::ui_updates::{
    HttpUiUpdateSender, NullUiUpdateSender, UiUpdateSender,
};
use podcast_core::orchestration::{StageOrchestrator, StandardStageClassifier};
use podcast_core::storage::{run_migrations, PgIdempotencyStore, PgWorkflowStore};
use podcast_core::web::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();
    let config = OrchestratorConfig::load().context("loading configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.connect_timeout())
        .connect(&config.database.url)
        .await
        .context("connecting to database")?;
    run_migrations(&pool).await.context("running migrations")?;

    let idempotency = Arc::new(PgIdempotencyStore::new(
        pool.clone(),
        config.idempotency.lock_timeout(),
    ));
    let workflows = Arc::new(PgWorkflowStore::new(pool));
    let client =
        AsyncCollaboratorClient::new(config.http_client.clone()).context("building HTTP client")?;
    let ui: Arc<dyn UiUpdateSender> = match &config.ui_updates.endpoint {
        Some(endpoint) => Arc::new(
            HttpUiUpdateSender::new(endpoint.clone()).context("building UI update sender")?,
        ),
        None => Arc::new(NullUiUpdateSender),
    };

    let orchestrator = Arc::new(StageOrchestrator::new(
        idempotency,
        workflows,
        client,
        Arc::new(StandardStageClassifier),
        ui,
        config.stages.clone(),
    ));
    let router = build_router(AppState::new(orchestrator));

    let listener = tokio::net::TcpListener::bind(&config.web.bind_address)
        .await
        .context("binding listener")?;
    info!(address = %config.web.bind_address, "podcast orchestration API listening");
    axum::serve(listener, router).await.context("serving API")?;
    Ok(())
}
