//! # Stage Orchestrator
//!
//! Sequences the fixed `WCHA → PSWA → VFA → ASF_NOTIFY` pipeline: one
//! `task_instance` per stage, every collaborator call wrapped by the
//! idempotent task wrapper under a per-stage key, fatal failures
//! short-circuiting and degradable ones folding into a partial result.
//!
//! Harvest and script failures always abort: their outputs feed every later
//! stage. The classifier decides only where a choice exists (voice, notify).

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::error_classifier::{FailureDisposition, StageFailureClassifier};
use super::errors::{LogicalErrorKind, OrchestrationError, OrchestrationResult};
use super::stages::{
    derive_stage_key, parse_harvest, parse_notify, parse_script, parse_voice, summarize_output,
    PipelineStage,
};
use super::tracker::WorkflowTracker;
use super::types::{
    AudioDetails, HarvestResult, OrchestrationLogEntry, PodcastRequest, ScriptResult,
    VoiceOutcome, WorkflowOutcome,
};
use super::ui_updates::{UiUpdate, UiUpdateSender};
use crate::client::{AsyncCollaboratorClient, CallHeaders};
use crate::config::StageEndpoints;
use crate::constants::operation_names;
use crate::idempotency::run_idempotent;
use crate::logging::log_stage_operation;
use crate::models::{IdempotencyStatus, WorkflowInstance};
use crate::state_machine::{StageTaskEvent, WorkflowEvent, WorkflowState};
use crate::storage::{AcquireOutcome, IdempotencyStore, StorageError, WorkflowStore};

pub struct StageOrchestrator {
    idempotency: Arc<dyn IdempotencyStore>,
    tracker: WorkflowTracker,
    client: AsyncCollaboratorClient,
    classifier: Arc<dyn StageFailureClassifier>,
    ui: Arc<dyn UiUpdateSender>,
    endpoints: StageEndpoints,
}

impl StageOrchestrator {
    pub fn new(
        idempotency: Arc<dyn IdempotencyStore>,
        workflow_store: Arc<dyn WorkflowStore>,
        client: AsyncCollaboratorClient,
        classifier: Arc<dyn StageFailureClassifier>,
        ui: Arc<dyn UiUpdateSender>,
        endpoints: StageEndpoints,
    ) -> Self {
        Self {
            idempotency,
            tracker: WorkflowTracker::new(workflow_store),
            client,
            classifier,
            ui,
            endpoints,
        }
    }

    pub fn workflow_store(&self) -> &Arc<dyn WorkflowStore> {
        self.tracker.store()
    }

    /// Validate the request and create the workflow instance for a run.
    pub async fn create_workflow_instance(
        &self,
        request: &PodcastRequest,
    ) -> OrchestrationResult<WorkflowInstance> {
        if request.topic.trim().is_empty() {
            return Err(OrchestrationError::Validation {
                field: "topic".to_string(),
                reason: "topic must not be empty".to_string(),
            });
        }
        let context = json!({
            "topic": request.topic.clone(),
            "client_id": request.client_id.clone(),
            "request": serde_json::to_value(request).map_err(serialization_error)?,
        });
        self.tracker.create_workflow(context).await
    }

    /// Run one orchestration to its terminal status under the top-level key.
    ///
    /// The idempotency protocol is applied inline here instead of through
    /// [`run_idempotent`] because the record's terminal status depends on the
    /// outcome: degraded and full successes are COMPLETED (replays return the
    /// stored outcome verbatim), while a fatally failed workflow leaves a
    /// FAILED record so a retry with the same key re-executes and, thanks to
    /// the per-stage keys, resumes from the failed stage.
    pub async fn run(
        &self,
        workflow_id: Uuid,
        request: PodcastRequest,
        parent_key: &str,
    ) -> OrchestrationResult<WorkflowOutcome> {
        let task_name = operation_names::GENERATE_PODCAST;
        if parent_key.trim().is_empty() {
            return Err(OrchestrationError::MissingIdempotencyKey {
                task_name: task_name.to_string(),
            });
        }

        if let Some(record) = self.idempotency.check(parent_key, task_name).await? {
            match record.parsed_status() {
                Ok(IdempotencyStatus::Completed) => {
                    let payload = record.result_payload.unwrap_or(Value::Null);
                    return serde_json::from_value(payload).map_err(|e| {
                        OrchestrationError::Storage(StorageError::InvariantViolation(format!(
                            "stored workflow outcome unreadable: {e}"
                        )))
                    });
                }
                Ok(IdempotencyStatus::Processing)
                    if !record.is_lock_expired(self.idempotency.lock_timeout()) =>
                {
                    return Err(OrchestrationError::IdempotencyConflict {
                        key: parent_key.to_string(),
                        task_name: task_name.to_string(),
                        locked_at: record.locked_at,
                    });
                }
                _ => {}
            }
        }

        match self
            .idempotency
            .acquire(parent_key, task_name, Some(&workflow_id.to_string()))
            .await?
        {
            AcquireOutcome::Acquired => {}
            AcquireOutcome::Conflict { locked_at } => {
                return Err(OrchestrationError::IdempotencyConflict {
                    key: parent_key.to_string(),
                    task_name: task_name.to_string(),
                    locked_at,
                });
            }
        }

        match self.execute(workflow_id, request, parent_key).await {
            Ok(outcome) => {
                let payload = serde_json::to_value(&outcome).map_err(serialization_error)?;
                if outcome.status == WorkflowState::Failed {
                    self.idempotency.fail(parent_key, task_name, &payload).await?;
                } else {
                    self.idempotency
                        .complete(parent_key, task_name, &payload)
                        .await?;
                }
                Ok(outcome)
            }
            Err(error) => {
                let error_payload = error.to_error_payload();
                if let Err(store_error) = self
                    .idempotency
                    .fail(parent_key, task_name, &error_payload)
                    .await
                {
                    warn!(
                        workflow_id = %workflow_id,
                        error = %store_error,
                        "failed to record workflow failure on idempotency key"
                    );
                }
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        workflow_id: Uuid,
        request: PodcastRequest,
        parent_key: &str,
    ) -> OrchestrationResult<WorkflowOutcome> {
        let topic = request.topic.clone();
        let workflow_ref = workflow_id.to_string();
        let mut log: Vec<OrchestrationLogEntry> = Vec::new();
        let mut warnings = false;

        self.tracker
            .transition_workflow(workflow_id, WorkflowEvent::Start, None)
            .await?;
        info!(workflow_id = %workflow_id, topic = %topic, "orchestration run started");

        // WCHA: live fetch with offline fallback inside one idempotent body.
        let harvest_key = derive_stage_key(parent_key, PipelineStage::Harvest);
        let harvest_body = async {
            let headers = CallHeaders {
                idempotency_key: &harvest_key,
                workflow_id: Some(&workflow_ref),
            };
            let live = self
                .client
                .call(
                    &self.endpoints.harvest_url,
                    &json!({"topic": topic.clone(), "source_mode": "live"}),
                    headers,
                )
                .await
                .and_then(parse_harvest);

            let fallback_trigger = match live {
                Ok(result) if result.is_usable() => {
                    return serde_json::to_value(result).map_err(serialization_error)
                }
                Ok(_) => "live source returned empty content".to_string(),
                Err(error) => error.to_string(),
            };

            warn!(
                workflow_id = %workflow_id,
                reason = %fallback_trigger,
                "live harvest unusable, trying offline source"
            );
            let offline = self
                .client
                .call(
                    &self.endpoints.harvest_url,
                    &json!({"topic": topic.clone(), "source_mode": "offline"}),
                    headers,
                )
                .await
                .and_then(parse_harvest)?;
            if offline.is_usable() {
                serde_json::to_value(offline).map_err(serialization_error)
            } else {
                Err(OrchestrationError::CollaboratorLogical {
                    kind: LogicalErrorKind::Error,
                    message: format!(
                        "harvest exhausted live and offline sources for topic '{topic}'"
                    ),
                    detail: json!({"fallback_trigger": fallback_trigger}),
                })
            }
        };
        let harvest_value = match self
            .run_stage(
                workflow_id,
                PipelineStage::Harvest,
                &harvest_key,
                json!({"topic": topic.clone()}),
                harvest_body,
                &mut log,
            )
            .await
        {
            Ok(value) => value,
            Err(error) => {
                if error.is_storage() {
                    return Err(error);
                }
                return self
                    .finalize_failed(
                        workflow_id,
                        PipelineStage::Harvest,
                        error,
                        None,
                        None,
                        std::mem::take(&mut log),
                    )
                    .await;
            }
        };
        let harvest: HarvestResult = match serde_json::from_value(harvest_value) {
            Ok(result) => result,
            Err(e) => {
                return self
                    .finalize_failed(
                        workflow_id,
                        PipelineStage::Harvest,
                        serialization_error(e),
                        None,
                        None,
                        std::mem::take(&mut log),
                    )
                    .await
            }
        };

        // PSWA
        let script_key = derive_stage_key(parent_key, PipelineStage::Script);
        let script_payload = json!({
            "topic": topic.clone(),
            "content": harvest.content.clone(),
            "source_urls": harvest.source_urls.clone(),
            "user_preferences": request.user_preferences.clone(),
        });
        let script_body = async {
            let value = self
                .client
                .call(
                    &self.endpoints.script_url,
                    &script_payload,
                    CallHeaders {
                        idempotency_key: &script_key,
                        workflow_id: Some(&workflow_ref),
                    },
                )
                .await?;
            let script = parse_script(value)?;
            serde_json::to_value(script).map_err(serialization_error)
        };
        let script_value = match self
            .run_stage(
                workflow_id,
                PipelineStage::Script,
                &script_key,
                json!({"topic": topic.clone(), "content_chars": harvest.content.len()}),
                script_body,
                &mut log,
            )
            .await
        {
            Ok(value) => value,
            Err(error) => {
                if error.is_storage() {
                    return Err(error);
                }
                return self
                    .finalize_failed(
                        workflow_id,
                        PipelineStage::Script,
                        error,
                        None,
                        None,
                        std::mem::take(&mut log),
                    )
                    .await;
            }
        };
        let script: ScriptResult = match serde_json::from_value(script_value) {
            Ok(result) => result,
            Err(e) => {
                return self
                    .finalize_failed(
                        workflow_id,
                        PipelineStage::Script,
                        serialization_error(e),
                        None,
                        None,
                        std::mem::take(&mut log),
                    )
                    .await
            }
        };

        // VFA: an explicit skip surfaces as a degradable stage failure.
        let voice_key = derive_stage_key(parent_key, PipelineStage::Voice);
        let voice_payload = json!({
            "script": serde_json::to_value(&script).map_err(serialization_error)?,
            "voice_params": request.voice_params.clone(),
        });
        let voice_body = async {
            let value = self
                .client
                .call(
                    &self.endpoints.voice_url,
                    &voice_payload,
                    CallHeaders {
                        idempotency_key: &voice_key,
                        workflow_id: Some(&workflow_ref),
                    },
                )
                .await?;
            match parse_voice(value)? {
                outcome @ VoiceOutcome::Synthesized { .. } => {
                    serde_json::to_value(outcome).map_err(serialization_error)
                }
                VoiceOutcome::Skipped { reason } => {
                    let detail = json!({"reason": reason.clone()});
                    Err(OrchestrationError::CollaboratorLogical {
                        kind: LogicalErrorKind::Skipped,
                        message: if reason.is_empty() {
                            "voice synthesis skipped".to_string()
                        } else {
                            reason
                        },
                        detail,
                    })
                }
            }
        };
        let mut audio: Option<AudioDetails> = None;
        match self
            .run_stage(
                workflow_id,
                PipelineStage::Voice,
                &voice_key,
                json!({"script_id": script.script_id.clone(), "segments": script.segments.len()}),
                voice_body,
                &mut log,
            )
            .await
        {
            Ok(value) => match serde_json::from_value::<VoiceOutcome>(value) {
                Ok(outcome) => audio = outcome.audio_details(),
                Err(e) => {
                    return self
                        .finalize_failed(
                            workflow_id,
                            PipelineStage::Voice,
                            serialization_error(e),
                            Some(script),
                            None,
                            std::mem::take(&mut log),
                        )
                        .await
                }
            },
            Err(error) => {
                if error.is_storage() {
                    return Err(error);
                }
                match self.classifier.classify(PipelineStage::Voice, &error) {
                    FailureDisposition::Degradable => {
                        warnings = true;
                        self.notify_ui(UiUpdate::stage_update(
                            workflow_id,
                            PipelineStage::Voice.name(),
                            "failed",
                            error.to_string(),
                        ))
                        .await;
                    }
                    FailureDisposition::Fatal => {
                        return self
                            .finalize_failed(
                                workflow_id,
                                PipelineStage::Voice,
                                error,
                                Some(script),
                                None,
                                std::mem::take(&mut log),
                            )
                            .await
                    }
                }
            }
        }

        // ASF_NOTIFY: only meaningful when audio exists; its failure never
        // discards the audio that was already produced.
        if let Some(details) = audio.clone() {
            let notify_key = derive_stage_key(parent_key, PipelineStage::Notify);
            let notify_payload = json!({
                "workflow_id": workflow_ref.clone(),
                "stream_id": details.stream_id.clone(),
                "audio_filepath": details.audio_filepath.clone(),
            });
            let notify_body = async {
                let value = self
                    .client
                    .call(
                        &self.endpoints.notify_url,
                        &notify_payload,
                        CallHeaders {
                            idempotency_key: &notify_key,
                            workflow_id: Some(&workflow_ref),
                        },
                    )
                    .await?;
                let notify = parse_notify(value)?;
                if !notify.notification_successful {
                    return Err(OrchestrationError::CollaboratorLogical {
                        kind: LogicalErrorKind::Error,
                        message: "stream notification rejected".to_string(),
                        detail: notify.error_details.clone().unwrap_or(Value::Null),
                    });
                }
                serde_json::to_value(notify).map_err(serialization_error)
            };
            if let Err(error) = self
                .run_stage(
                    workflow_id,
                    PipelineStage::Notify,
                    &notify_key,
                    json!({"stream_id": details.stream_id.clone(), "audio_filepath": details.audio_filepath.clone()}),
                    notify_body,
                    &mut log,
                )
                .await
            {
                if error.is_storage() {
                    return Err(error);
                }
                match self.classifier.classify(PipelineStage::Notify, &error) {
                    FailureDisposition::Degradable => {
                        warnings = true;
                        self.notify_ui(UiUpdate::stage_update(
                            workflow_id,
                            PipelineStage::Notify.name(),
                            "failed",
                            error.to_string(),
                        ))
                        .await;
                    }
                    FailureDisposition::Fatal => {
                        return self
                            .finalize_failed(
                                workflow_id,
                                PipelineStage::Notify,
                                error,
                                Some(script),
                                audio,
                                std::mem::take(&mut log),
                            )
                            .await
                    }
                }
            }
        }

        self.finalize_success(workflow_id, warnings, audio, script, log)
            .await
    }

    /// Track one stage: task instance, idempotent execution, status updates.
    async fn run_stage<Fut>(
        &self,
        workflow_id: Uuid,
        stage: PipelineStage,
        stage_key: &str,
        input_summary: Value,
        body: Fut,
        log: &mut Vec<OrchestrationLogEntry>,
    ) -> OrchestrationResult<Value>
    where
        Fut: Future<Output = OrchestrationResult<Value>>,
    {
        let task = self
            .tracker
            .create_task(workflow_id, stage.name(), stage.order(), input_summary)
            .await?;
        self.tracker
            .transition_task(task.task_id, StageTaskEvent::Start, None, None)
            .await?;
        self.notify_ui(UiUpdate::stage_update(
            workflow_id,
            stage.name(),
            "in_progress",
            format!("{stage} stage started"),
        ))
        .await;

        let workflow_ref = workflow_id.to_string();
        match run_idempotent(
            self.idempotency.as_ref(),
            stage_key,
            stage.name(),
            Some(&workflow_ref),
            move || body,
        )
        .await
        {
            Ok(value) => {
                self.tracker
                    .transition_task(
                        task.task_id,
                        StageTaskEvent::Complete,
                        Some(summarize_output(stage, &value)),
                        None,
                    )
                    .await?;
                log.push(OrchestrationLogEntry::new(
                    stage.name(),
                    "completed",
                    format!("{stage} stage completed"),
                ));
                log_stage_operation(workflow_id, stage.name(), "completed", None);
                self.notify_ui(UiUpdate::stage_update(
                    workflow_id,
                    stage.name(),
                    "completed",
                    format!("{stage} stage completed"),
                ))
                .await;
                Ok(value)
            }
            Err(error) => {
                let message = error.to_string();
                self.tracker
                    .transition_task(
                        task.task_id,
                        StageTaskEvent::Fail(message.clone()),
                        None,
                        Some(error.to_error_payload()),
                    )
                    .await?;
                log.push(OrchestrationLogEntry::new(stage.name(), "failed", message.clone()));
                log_stage_operation(workflow_id, stage.name(), "failed", Some(&message));
                Err(error)
            }
        }
    }

    async fn finalize_success(
        &self,
        workflow_id: Uuid,
        warnings: bool,
        audio: Option<AudioDetails>,
        script: ScriptResult,
        mut log: Vec<OrchestrationLogEntry>,
    ) -> OrchestrationResult<WorkflowOutcome> {
        let (status, event) = if warnings {
            (
                WorkflowState::CompletedWithErrors,
                WorkflowEvent::CompleteWithWarnings,
            )
        } else {
            (WorkflowState::Completed, WorkflowEvent::Complete)
        };
        log.push(OrchestrationLogEntry::new(
            "WORKFLOW",
            &status.to_string(),
            "orchestration finished",
        ));

        let outcome = WorkflowOutcome {
            workflow_id,
            status,
            final_audio_details: audio,
            script: Some(script),
            error_message: None,
            orchestration_log: log,
        };
        let context = self.outcome_context(workflow_id, &outcome).await?;
        self.tracker
            .transition_workflow(workflow_id, event, Some(context))
            .await?;
        self.notify_ui(UiUpdate::terminal(
            workflow_id,
            &status.to_string(),
            "podcast generation finished",
        ))
        .await;
        info!(workflow_id = %workflow_id, status = %status, "orchestration run finished");
        Ok(outcome)
    }

    async fn finalize_failed(
        &self,
        workflow_id: Uuid,
        stage: PipelineStage,
        error: OrchestrationError,
        script: Option<ScriptResult>,
        audio: Option<AudioDetails>,
        mut log: Vec<OrchestrationLogEntry>,
    ) -> OrchestrationResult<WorkflowOutcome> {
        let message = error.to_string();
        self.notify_ui(UiUpdate::stage_error(
            workflow_id,
            stage.name(),
            message.clone(),
        ))
        .await;
        log.push(OrchestrationLogEntry::new(
            "WORKFLOW",
            "failed",
            message.clone(),
        ));

        let outcome = WorkflowOutcome {
            workflow_id,
            status: WorkflowState::Failed,
            final_audio_details: audio,
            script,
            error_message: Some(message.clone()),
            orchestration_log: log,
        };
        let context = self.outcome_context(workflow_id, &outcome).await?;
        self.tracker
            .transition_workflow(workflow_id, WorkflowEvent::Fail(message), Some(context))
            .await?;
        self.notify_ui(UiUpdate::terminal(
            workflow_id,
            "failed",
            "podcast generation failed",
        ))
        .await;
        info!(workflow_id = %workflow_id, stage = %stage, "orchestration run failed");
        Ok(outcome)
    }

    /// Merge the structured outcome into the workflow's context data.
    async fn outcome_context(
        &self,
        workflow_id: Uuid,
        outcome: &WorkflowOutcome,
    ) -> OrchestrationResult<Value> {
        let workflow = self
            .tracker
            .store()
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: "workflow".to_string(),
                id: workflow_id.to_string(),
            })?;
        let mut context = workflow.context_data;
        if !context.is_object() {
            context = json!({});
        }
        context["result"] = serde_json::to_value(outcome).map_err(serialization_error)?;
        Ok(context)
    }

    async fn notify_ui(&self, update: UiUpdate) {
        if let Err(error) = self.ui.send(&update).await {
            warn!(
                workflow_id = %update.workflow_id,
                error = %error,
                "ui update delivery failed"
            );
        }
    }

    /// Topic discovery: a single tracked idempotent collaborator call.
    pub async fn discover_topics(
        &self,
        query: &str,
        idempotency_key: &str,
    ) -> OrchestrationResult<Value> {
        if query.trim().is_empty() {
            return Err(OrchestrationError::Validation {
                field: "query".to_string(),
                reason: "query must not be empty".to_string(),
            });
        }
        self.run_single_operation(
            operation_names::TOPIC_DISCOVERY,
            self.endpoints.topic_discovery_url.clone(),
            json!({"query": query}),
            idempotency_key,
        )
        .await
    }

    /// Snippet crafting: a single tracked idempotent collaborator call.
    pub async fn craft_snippet(
        &self,
        topic: &str,
        script_id: Option<&str>,
        idempotency_key: &str,
    ) -> OrchestrationResult<Value> {
        if topic.trim().is_empty() {
            return Err(OrchestrationError::Validation {
                field: "topic".to_string(),
                reason: "topic must not be empty".to_string(),
            });
        }
        self.run_single_operation(
            operation_names::SNIPPET_CRAFT,
            self.endpoints.snippet_url.clone(),
            json!({"topic": topic, "script_id": script_id}),
            idempotency_key,
        )
        .await
    }

    /// One-shot operations share the stage machinery: a workflow instance
    /// with a single task, created inside the idempotent body so replays and
    /// conflicts leave no orphan rows.
    async fn run_single_operation(
        &self,
        name: &str,
        url: String,
        payload: Value,
        idempotency_key: &str,
    ) -> OrchestrationResult<Value> {
        let body = async {
            let workflow = self
                .tracker
                .create_workflow(json!({"operation": name, "payload": payload.clone()}))
                .await?;
            let workflow_id = workflow.workflow_id;
            self.tracker
                .transition_workflow(workflow_id, WorkflowEvent::Start, None)
                .await?;
            let task = self
                .tracker
                .create_task(workflow_id, name, 1, payload.clone())
                .await?;
            self.tracker
                .transition_task(task.task_id, StageTaskEvent::Start, None, None)
                .await?;

            let workflow_ref = workflow_id.to_string();
            match self
                .client
                .call(
                    &url,
                    &payload,
                    CallHeaders {
                        idempotency_key,
                        workflow_id: Some(&workflow_ref),
                    },
                )
                .await
            {
                Ok(value) => {
                    self.tracker
                        .transition_task(
                            task.task_id,
                            StageTaskEvent::Complete,
                            Some(value.clone()),
                            None,
                        )
                        .await?;
                    let mut context = workflow.context_data;
                    if !context.is_object() {
                        context = json!({});
                    }
                    context["result"] = value.clone();
                    self.tracker
                        .transition_workflow(workflow_id, WorkflowEvent::Complete, Some(context))
                        .await?;
                    Ok(value)
                }
                Err(error) => {
                    self.tracker
                        .transition_task(
                            task.task_id,
                            StageTaskEvent::Fail(error.to_string()),
                            None,
                            Some(error.to_error_payload()),
                        )
                        .await?;
                    self.tracker
                        .transition_workflow(
                            workflow_id,
                            WorkflowEvent::Fail(error.to_string()),
                            None,
                        )
                        .await?;
                    Err(error)
                }
            }
        };
        run_idempotent(
            self.idempotency.as_ref(),
            idempotency_key,
            name,
            None,
            move || body,
        )
        .await
    }
}

fn serialization_error(e: serde_json::Error) -> OrchestrationError {
    OrchestrationError::Validation {
        field: "stage_result".to_string(),
        reason: e.to_string(),
    }
}
