//! # Podcast Core
//!
//! Workflow orchestration core for a multi-service podcast generation
//! pipeline. Independent collaborator services (content harvesting, script
//! weaving, voice synthesis, stream notification) expose a submit-then-poll
//! HTTP protocol; this crate sequences them, guarantees exactly-once
//! effective execution through durable idempotency keys, tracks workflow and
//! task state for observability, and degrades to partial results on
//! recoverable stage failures.
//!
//! ## Module Organization
//!
//! - [`models`] - Persisted data models (workflow, task, idempotency record)
//! - [`storage`] - Store traits with PostgreSQL and in-memory backends
//! - [`state_machine`] - Workflow and stage-task state management
//! - [`idempotency`] - The idempotent task wrapper
//! - [`client`] - Generic submit-then-poll collaborator client
//! - [`orchestration`] - Stage sequencing, failure classification, tracking
//! - [`web`] - REST API (submit + status polling)
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use podcast_core::client::AsyncCollaboratorClient;
//! use podcast_core::config::OrchestratorConfig;
//! use podcast_core::orchestration::{StageOrchestrator, StandardStageClassifier};
//! use podcast_core::orchestration::ui_updates::NullUiUpdateSender;
//! use podcast_core::storage::{InMemoryIdempotencyStore, InMemoryWorkflowStore};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::default();
//! let orchestrator = StageOrchestrator::new(
//!     Arc::new(InMemoryIdempotencyStore::new(Duration::from_secs(300))),
//!     Arc::new(InMemoryWorkflowStore::new()),
//!     AsyncCollaboratorClient::new(config.http_client.clone())?,
//!     Arc::new(StandardStageClassifier),
//!     Arc::new(NullUiUpdateSender),
//!     config.stages.clone(),
//! );
//! # let _ = orchestrator;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod idempotency;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod storage;
pub mod web;

pub use config::OrchestratorConfig;
pub use orchestration::{
    OrchestrationError, OrchestrationResult, PodcastRequest, StageOrchestrator, WorkflowOutcome,
};
pub use state_machine::{StageTaskState, WorkflowState};
