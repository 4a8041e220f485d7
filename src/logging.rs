//! # Structured Logging Module
//!
//! Environment-aware structured logging for tracing multi-stage orchestration
//! runs across collaborator boundaries.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; an already-installed global subscriber (e.g.
/// from a test harness) is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json_output = std::env::var("PODCAST_LOG_FORMAT")
            .map(|v| v == "json")
            .unwrap_or(false);

        let result = if json_output {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_target(true).with_filter(filter))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_filter(filter))
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("global tracing subscriber already initialized");
        } else {
            tracing::info!(environment = %environment, "structured logging initialized");
        }
    });
}

/// Get current environment from environment variables.
fn get_environment() -> String {
    std::env::var("PODCAST_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment.
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log a workflow state transition.
pub fn log_workflow_transition(workflow_id: Uuid, from: Option<&str>, to: &str, event: &str) {
    tracing::info!(
        workflow_id = %workflow_id,
        from = from,
        to = %to,
        event = %event,
        "📋 WORKFLOW_TRANSITION"
    );
}

/// Log a stage operation with its outcome.
pub fn log_stage_operation(workflow_id: Uuid, stage: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        workflow_id = %workflow_id,
        stage = %stage,
        status = %status,
        details = details,
        "🔧 STAGE_OPERATION"
    );
}
