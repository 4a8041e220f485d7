//! Stage definitions and stage-boundary payload validation.
//!
//! The collaborator client returns raw JSON; these parsers enforce each
//! stage's contract and convert logical errors reported inside 200-OK bodies
//! into typed [`OrchestrationError::CollaboratorLogical`] values.

use serde_json::Value;

use super::errors::{LogicalErrorKind, OrchestrationError, OrchestrationResult};
use super::types::{HarvestResult, NotifyResult, ScriptResult, VoiceOutcome};
use crate::constants::stage_names;

/// The fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Harvest,
    Script,
    Voice,
    Notify,
}

impl PipelineStage {
    /// Stage identifier recorded on task instances and used in stage keys.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Harvest => stage_names::HARVEST,
            Self::Script => stage_names::SCRIPT,
            Self::Voice => stage_names::VOICE,
            Self::Notify => stage_names::NOTIFY,
        }
    }

    /// 1-based sequence position.
    pub fn order(&self) -> i32 {
        match self {
            Self::Harvest => 1,
            Self::Script => 2,
            Self::Voice => 3,
            Self::Notify => 4,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Derive the per-stage idempotency key from the parent request key.
///
/// Stage keys are individually checked and completed, so a retried workflow
/// resumes from its failed stage instead of redoing completed ones.
pub fn derive_stage_key(parent_key: &str, stage: PipelineStage) -> String {
    format!("{parent_key}:{}", stage.name())
}

/// Reject payloads that carry an embedded logical error marker.
fn reject_embedded_error(stage: PipelineStage, value: &Value) -> OrchestrationResult<()> {
    if value.get("status").and_then(Value::as_str) == Some("error") {
        let message = value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("collaborator reported an error")
            .to_string();
        return Err(OrchestrationError::CollaboratorLogical {
            kind: LogicalErrorKind::Error,
            message: format!("{stage} stage: {message}"),
            detail: value.clone(),
        });
    }
    Ok(())
}

/// Validate a harvest payload.
pub fn parse_harvest(value: Value) -> OrchestrationResult<HarvestResult> {
    reject_embedded_error(PipelineStage::Harvest, &value)?;
    serde_json::from_value(value.clone()).map_err(|e| OrchestrationError::CollaboratorLogical {
        kind: LogicalErrorKind::Malformed,
        message: format!("harvest payload invalid: {e}"),
        detail: value,
    })
}

/// Validate a script payload: structural serde checks plus the semantic
/// requirements (non-empty `script_id` and at least one segment).
pub fn parse_script(value: Value) -> OrchestrationResult<ScriptResult> {
    reject_embedded_error(PipelineStage::Script, &value)?;
    let script: ScriptResult =
        serde_json::from_value(value.clone()).map_err(|e| OrchestrationError::CollaboratorLogical {
            kind: LogicalErrorKind::Malformed,
            message: format!("script payload invalid: {e}"),
            detail: value.clone(),
        })?;

    if script.script_id.trim().is_empty() {
        return Err(OrchestrationError::CollaboratorLogical {
            kind: LogicalErrorKind::Malformed,
            message: "script payload missing script_id".to_string(),
            detail: value,
        });
    }
    if script.segments.is_empty() {
        return Err(OrchestrationError::CollaboratorLogical {
            kind: LogicalErrorKind::Malformed,
            message: "script payload has no segments".to_string(),
            detail: value,
        });
    }
    Ok(script)
}

/// Validate a voice payload into its tagged outcome.
pub fn parse_voice(value: Value) -> OrchestrationResult<VoiceOutcome> {
    reject_embedded_error(PipelineStage::Voice, &value)?;
    serde_json::from_value(value.clone()).map_err(|e| OrchestrationError::CollaboratorLogical {
        kind: LogicalErrorKind::Malformed,
        message: format!("voice payload invalid: {e}"),
        detail: value,
    })
}

/// Compact per-stage summary stored on the task instance; full payloads stay
/// in the idempotency record.
pub fn summarize_output(stage: PipelineStage, value: &Value) -> Value {
    match stage {
        PipelineStage::Harvest => serde_json::json!({
            "content_chars": value
                .get("content")
                .and_then(Value::as_str)
                .map(str::len)
                .unwrap_or(0),
            "source_urls": value
                .get("source_urls")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0),
        }),
        PipelineStage::Script => serde_json::json!({
            "script_id": value.get("script_id").cloned().unwrap_or(Value::Null),
            "segments": value
                .get("segments")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0),
        }),
        PipelineStage::Voice => serde_json::json!({
            "audio_filepath": value.get("audio_filepath").cloned().unwrap_or(Value::Null),
            "stream_id": value.get("stream_id").cloned().unwrap_or(Value::Null),
        }),
        PipelineStage::Notify => value.clone(),
    }
}

/// Validate a notify payload. Bodies without an explicit flag count as a
/// delivered notification; the transport already answered 2xx.
pub fn parse_notify(value: Value) -> OrchestrationResult<NotifyResult> {
    reject_embedded_error(PipelineStage::Notify, &value)?;
    Ok(NotifyResult {
        notification_successful: value
            .get("notification_successful")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        error_details: value.get("error_details").cloned(),
    })
}
