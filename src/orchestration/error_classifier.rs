//! # Stage Failure Classification
//!
//! Decides whether a stage failure aborts the pipeline or degrades the
//! workflow to a partial success. The classification is a typed table over
//! `(stage, error variant)` pairs rather than string matching on status
//! messages, so the boundary is auditable in one place.

use super::errors::{LogicalErrorKind, OrchestrationError};
use super::stages::PipelineStage;

/// Disposition of a failed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Stop the pipeline and fail the workflow.
    Fatal,
    /// Record the failure, continue, and finish with warnings.
    Degradable,
}

/// Strategy trait for stage failure classification.
pub trait StageFailureClassifier: Send + Sync {
    fn classify(&self, stage: PipelineStage, error: &OrchestrationError) -> FailureDisposition;

    /// Name for logging and diagnostics.
    fn classifier_name(&self) -> &'static str;
}

/// Default classification policy.
///
/// - Notify-stage failures are always degradable: the audio already exists
///   and a missed stream notification must not discard it.
/// - An explicit voice `skipped` answer is degradable: the script survives
///   with no audio.
/// - Everything else is fatal, storage errors included.
pub struct StandardStageClassifier;

impl StageFailureClassifier for StandardStageClassifier {
    fn classify(&self, stage: PipelineStage, error: &OrchestrationError) -> FailureDisposition {
        match (stage, error) {
            // Storage failures compromise the at-most-once guarantee no
            // matter which stage hit them.
            (_, OrchestrationError::Storage(_)) => FailureDisposition::Fatal,

            (PipelineStage::Notify, _) => FailureDisposition::Degradable,

            (
                PipelineStage::Voice,
                OrchestrationError::CollaboratorLogical {
                    kind: LogicalErrorKind::Skipped,
                    ..
                },
            ) => FailureDisposition::Degradable,

            _ => FailureDisposition::Fatal,
        }
    }

    fn classifier_name(&self) -> &'static str {
        "standard"
    }
}
