//! # Web API Application State
//!
//! Shared state for request handlers: the orchestrator and the registry of
//! in-flight runs spawned by submit requests.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::orchestration::pipeline::StageOrchestrator;
use crate::storage::WorkflowStore;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<StageOrchestrator>,
    runs: Arc<DashMap<Uuid, JoinHandle<()>>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<StageOrchestrator>) -> Self {
        Self {
            orchestrator,
            runs: Arc::new(DashMap::new()),
        }
    }

    pub fn workflow_store(&self) -> &Arc<dyn WorkflowStore> {
        self.orchestrator.workflow_store()
    }

    /// Track a spawned orchestration run for observability.
    pub fn track_run(&self, workflow_id: Uuid, handle: JoinHandle<()>) {
        self.runs.insert(workflow_id, handle);
    }

    /// Drop registry entries whose runs have finished.
    pub fn prune_finished(&self) {
        self.runs.retain(|_, handle| !handle.is_finished());
    }

    /// Number of currently tracked in-flight runs.
    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }
}
