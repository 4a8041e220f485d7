//! # Orchestration Types
//!
//! Typed records passed between stages and returned to API callers. Each
//! stage's payload is validated into one of these at the stage boundary;
//! nothing downstream touches raw JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::WorkflowState;

/// A top-level podcast generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodcastRequest {
    pub topic: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub voice_params: Option<serde_json::Value>,
    #[serde(default)]
    pub user_preferences: Option<serde_json::Value>,
}

/// Output of the content harvesting stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestResult {
    pub content: String,
    #[serde(default)]
    pub source_urls: Vec<String>,
}

impl HarvestResult {
    /// Harvested content that is empty or whitespace cannot feed the script
    /// stage and triggers the offline fallback.
    pub fn is_usable(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// One segment of a woven podcast script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSegment {
    pub segment_title: String,
    pub content: String,
}

/// Output of the script weaving stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptResult {
    pub script_id: String,
    pub title: String,
    pub segments: Vec<ScriptSegment>,
}

impl ScriptResult {
    /// Total spoken characters across segments.
    pub fn content_len(&self) -> usize {
        self.segments.iter().map(|s| s.content.len()).sum()
    }
}

/// Audio descriptor produced by a successful voice synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDetails {
    pub audio_filepath: String,
    pub stream_id: String,
    #[serde(default)]
    pub tts_settings: Option<serde_json::Value>,
}

/// Outcome of the voice synthesis stage.
///
/// `Skipped` is a definitive collaborator answer (script below minimum
/// length), not a transport failure; the orchestrator treats it as a
/// degradable stage failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VoiceOutcome {
    #[serde(rename = "success")]
    Synthesized {
        audio_filepath: String,
        stream_id: String,
        #[serde(default)]
        tts_settings: Option<serde_json::Value>,
    },
    Skipped {
        #[serde(default)]
        reason: String,
    },
}

impl VoiceOutcome {
    pub fn audio_details(&self) -> Option<AudioDetails> {
        match self {
            Self::Synthesized {
                audio_filepath,
                stream_id,
                tts_settings,
            } => Some(AudioDetails {
                audio_filepath: audio_filepath.clone(),
                stream_id: stream_id.clone(),
                tts_settings: tts_settings.clone(),
            }),
            Self::Skipped { .. } => None,
        }
    }
}

/// Outcome of the stream notification stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyResult {
    pub notification_successful: bool,
    #[serde(default)]
    pub error_details: Option<serde_json::Value>,
}

/// One entry in the per-run orchestration log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationLogEntry {
    pub stage: String,
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl OrchestrationLogEntry {
    pub fn new(stage: &str, status: &str, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            status: status.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Structured result of one orchestration run, returned to the caller and
/// persisted inside the workflow's `context_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub workflow_id: Uuid,
    pub status: WorkflowState,
    pub final_audio_details: Option<AudioDetails>,
    pub script: Option<ScriptResult>,
    pub error_message: Option<String>,
    pub orchestration_log: Vec<OrchestrationLogEntry>,
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_voice_outcome_serde_tagging() {
        let synthesized: VoiceOutcome = serde_json::from_value(json!({
            "status": "success",
            "audio_filepath": "/a.mp3",
            "stream_id": "st1"
        }))
        .unwrap();
        assert_eq!(
            synthesized.audio_details().unwrap().audio_filepath,
            "/a.mp3"
        );

        let skipped: VoiceOutcome = serde_json::from_value(json!({
            "status": "skipped",
            "reason": "script below minimum length"
        }))
        .unwrap();
        assert!(skipped.audio_details().is_none());

        let err = serde_json::from_value::<VoiceOutcome>(json!({"status": "error"}));
        assert!(err.is_err());
    }

    #[test]
    fn test_harvest_usability() {
        let usable = HarvestResult {
            content: "some article text".to_string(),
            source_urls: vec![],
        };
        assert!(usable.is_usable());

        let empty = HarvestResult {
            content: "   ".to_string(),
            source_urls: vec![],
        };
        assert!(!empty.is_usable());
    }
}
