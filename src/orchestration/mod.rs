//! # Orchestration Engine
//!
//! Stage sequencing for the podcast generation pipeline: typed stage
//! results, the fatal/degradable failure classifier, the workflow/task
//! tracker, best-effort UI updates, and the orchestrator itself.

pub mod error_classifier;
pub mod errors;
pub mod pipeline;
pub mod stages;
pub mod tracker;
pub mod types;
pub mod ui_updates;

pub use error_classifier::{FailureDisposition, StageFailureClassifier, StandardStageClassifier};
pub use errors::{LogicalErrorKind, OrchestrationError, OrchestrationResult};
pub use pipeline::StageOrchestrator;
pub use stages::{derive_stage_key, PipelineStage};
pub use tracker::WorkflowTracker;
pub use types::{
    AudioDetails, HarvestResult, NotifyResult, OrchestrationLogEntry, PodcastRequest,
    ScriptResult, ScriptSegment, VoiceOutcome, WorkflowOutcome,
};
pub use ui_updates::{HttpUiUpdateSender, NullUiUpdateSender, UiUpdate, UiUpdateSender};
