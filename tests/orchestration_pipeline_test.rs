//! End-to-end orchestration tests: the full stage pipeline against mock
//! collaborator services, in-memory stores, and a recording UI channel.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use uuid::Uuid;

use common::{PollingMock, StageMock};
use podcast_core::client::AsyncCollaboratorClient;
use podcast_core::config::{HttpClientConfig, StageEndpoints};
use podcast_core::models::IdempotencyRecord;
use podcast_core::orchestration::errors::{OrchestrationError, OrchestrationResult};
use podcast_core::orchestration::types::{PodcastRequest, WorkflowOutcome};
use podcast_core::orchestration::ui_updates::{UiUpdate, UiUpdateSender};
use podcast_core::orchestration::{StageOrchestrator, StandardStageClassifier};
use podcast_core::state_machine::WorkflowState;
use podcast_core::storage::{
    IdempotencyStore, InMemoryIdempotencyStore, InMemoryWorkflowStore, WorkflowStore,
};

struct RecordingUiSender {
    updates: Mutex<Vec<UiUpdate>>,
}

impl RecordingUiSender {
    fn new() -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
        }
    }

    fn updates(&self) -> Vec<UiUpdate> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl UiUpdateSender for RecordingUiSender {
    async fn send(&self, update: &UiUpdate) -> OrchestrationResult<()> {
        self.updates.lock().push(update.clone());
        Ok(())
    }
}

struct Harness {
    orchestrator: StageOrchestrator,
    idempotency: Arc<InMemoryIdempotencyStore>,
    workflows: Arc<InMemoryWorkflowStore>,
    ui: Arc<RecordingUiSender>,
}

impl Harness {
    async fn new(endpoints: StageEndpoints) -> Self {
        let idempotency = Arc::new(InMemoryIdempotencyStore::new(Duration::from_secs(300)));
        let workflows = Arc::new(InMemoryWorkflowStore::new());
        let ui = Arc::new(RecordingUiSender::new());
        let client = AsyncCollaboratorClient::new(HttpClientConfig {
            request_timeout_seconds: 5,
            max_retries: 1,
            backoff_factor: 0.001,
            poll_interval_ms: 10,
            poll_timeout_ms: 200,
        })
        .unwrap();
        let orchestrator = StageOrchestrator::new(
            idempotency.clone() as Arc<dyn IdempotencyStore>,
            workflows.clone() as Arc<dyn WorkflowStore>,
            client,
            Arc::new(StandardStageClassifier),
            ui.clone() as Arc<dyn UiUpdateSender>,
            endpoints,
        );
        Self {
            orchestrator,
            idempotency,
            workflows,
            ui,
        }
    }

    async fn run(&self, topic: &str, key: &str) -> OrchestrationResult<WorkflowOutcome> {
        let request = PodcastRequest {
            topic: topic.to_string(),
            client_id: Some("client-1".to_string()),
            voice_params: None,
            user_preferences: None,
        };
        let workflow = self
            .orchestrator
            .create_workflow_instance(&request)
            .await?;
        self.orchestrator
            .run(workflow.workflow_id, request, key)
            .await
    }

    async fn task_statuses(&self, workflow_id: Uuid) -> Vec<(String, String)> {
        self.workflows
            .list_tasks(workflow_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| (t.name, t.status))
            .collect()
    }
}

fn good_harvest() -> StageMock {
    StageMock::returning(
        200,
        json!({
            "content": "AI systems are increasingly used in clinical settings.",
            "source_urls": ["https://example.org/ai-health"],
        }),
    )
}

fn good_script() -> StageMock {
    StageMock::returning(
        200,
        json!({
            "script_id": "s1",
            "title": "T",
            "segments": [{"segment_title": "INTRO", "content": "Welcome to the show."}],
        }),
    )
}

fn good_voice() -> StageMock {
    StageMock::returning(
        200,
        json!({"status": "success", "audio_filepath": "/a.mp3", "stream_id": "st1"}),
    )
}

fn good_notify() -> StageMock {
    StageMock::returning(200, json!({"notification_successful": true}))
}

async fn endpoints_for(
    harvest: &StageMock,
    script: &StageMock,
    voice: &StageMock,
    notify: &StageMock,
) -> StageEndpoints {
    StageEndpoints {
        harvest_url: harvest.serve("/harvest").await,
        script_url: script.serve("/weave_script").await,
        voice_url: voice.serve("/synthesize").await,
        notify_url: notify.serve("/notify_stream").await,
        ..StageEndpoints::default()
    }
}

#[tokio::test]
async fn test_happy_path_end_to_end() {
    let (harvest, script, voice, notify) =
        (good_harvest(), good_script(), good_voice(), good_notify());
    let harness = Harness::new(endpoints_for(&harvest, &script, &voice, &notify).await).await;

    let outcome = harness.run("ai in healthcare", "req-1").await.unwrap();

    assert_eq!(outcome.status, WorkflowState::Completed);
    let audio = outcome.final_audio_details.unwrap();
    assert_eq!(audio.audio_filepath, "/a.mp3");
    assert_eq!(audio.stream_id, "st1");
    assert_eq!(outcome.script.unwrap().script_id, "s1");

    for mock in [&harvest, &script, &voice, &notify] {
        assert_eq!(mock.call_count(), 1);
    }

    // Persisted task instances in order, all terminal.
    assert_eq!(
        harness.task_statuses(outcome.workflow_id).await,
        vec![
            ("WCHA".to_string(), "completed".to_string()),
            ("PSWA".to_string(), "completed".to_string()),
            ("VFA".to_string(), "completed".to_string()),
            ("ASF_NOTIFY".to_string(), "completed".to_string()),
        ]
    );

    // Workflow row is terminal and carries the structured result.
    let workflow = harness
        .workflows
        .get_workflow(outcome.workflow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(workflow.status, "completed");
    assert_eq!(
        workflow.result().unwrap()["final_audio_details"]["audio_filepath"],
        "/a.mp3"
    );

    // Exactly one terminal UI update, sent last.
    let updates = harness.ui.updates();
    let terminal: Vec<_> = updates.iter().filter(|u| u.is_terminal).collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].status, "completed");
    assert!(updates.last().unwrap().is_terminal);

    // The voice stage received the woven script.
    let voice_request = voice.last_request.lock().clone().unwrap();
    assert_eq!(voice_request["script"]["script_id"], "s1");
}

#[tokio::test]
async fn test_malformed_script_short_circuits_before_voice() {
    let harvest = good_harvest();
    // Structurally invalid: no script_id, no segments.
    let script = StageMock::returning(200, json!({"title": "T"}));
    let (voice, notify) = (good_voice(), good_notify());
    let harness = Harness::new(endpoints_for(&harvest, &script, &voice, &notify).await).await;

    let outcome = harness.run("ai in healthcare", "req-1").await.unwrap();

    assert_eq!(outcome.status, WorkflowState::Failed);
    assert!(outcome.error_message.is_some());
    assert!(outcome.final_audio_details.is_none());

    // The pipeline stopped before the voice stage was ever invoked.
    assert_eq!(voice.call_count(), 0);
    assert_eq!(notify.call_count(), 0);

    assert_eq!(
        harness.task_statuses(outcome.workflow_id).await,
        vec![
            ("WCHA".to_string(), "completed".to_string()),
            ("PSWA".to_string(), "failed".to_string()),
        ]
    );

    let workflow = harness
        .workflows
        .get_workflow(outcome.workflow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(workflow.status, "failed");

    // A fatal failure emits a task_error update before the terminal one.
    let updates = harness.ui.updates();
    assert!(updates.iter().any(|u| u.event == "task_error"));
    assert_eq!(updates.last().unwrap().status, "failed");
}

#[tokio::test]
async fn test_voice_skip_degrades_to_completed_with_errors() {
    let (harvest, script) = (good_harvest(), good_script());
    let voice = StageMock::returning(
        200,
        json!({"status": "skipped", "reason": "script below minimum length"}),
    );
    let notify = good_notify();
    let harness = Harness::new(endpoints_for(&harvest, &script, &voice, &notify).await).await;

    let outcome = harness.run("ai in healthcare", "req-1").await.unwrap();

    assert_eq!(outcome.status, WorkflowState::CompletedWithErrors);
    assert!(outcome.final_audio_details.is_none());
    assert_eq!(outcome.script.unwrap().script_id, "s1");

    // No audio means nothing to announce to the stream feeder.
    assert_eq!(notify.call_count(), 0);

    assert_eq!(
        harness.task_statuses(outcome.workflow_id).await,
        vec![
            ("WCHA".to_string(), "completed".to_string()),
            ("PSWA".to_string(), "completed".to_string()),
            ("VFA".to_string(), "failed".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_notify_failure_keeps_audio_and_degrades() {
    let (harvest, script, voice) = (good_harvest(), good_script(), good_voice());
    let notify = good_notify();
    let mut endpoints = endpoints_for(&harvest, &script, &voice, &notify).await;
    endpoints.notify_url = common::unreachable_url("/notify_stream").await;
    let harness = Harness::new(endpoints).await;

    let outcome = harness.run("ai in healthcare", "req-1").await.unwrap();

    assert_eq!(outcome.status, WorkflowState::CompletedWithErrors);
    assert_eq!(outcome.final_audio_details.unwrap().audio_filepath, "/a.mp3");

    assert_eq!(
        harness.task_statuses(outcome.workflow_id).await,
        vec![
            ("WCHA".to_string(), "completed".to_string()),
            ("PSWA".to_string(), "completed".to_string()),
            ("VFA".to_string(), "completed".to_string()),
            ("ASF_NOTIFY".to_string(), "failed".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_whole_workflow_replay_invokes_no_collaborator() {
    let (harvest, script, voice, notify) =
        (good_harvest(), good_script(), good_voice(), good_notify());
    let harness = Harness::new(endpoints_for(&harvest, &script, &voice, &notify).await).await;

    let first = harness.run("ai in healthcare", "req-1").await.unwrap();
    let second = harness.run("ai in healthcare", "req-1").await.unwrap();

    assert_eq!(first, second);
    for mock in [&harvest, &script, &voice, &notify] {
        assert_eq!(mock.call_count(), 1);
    }
}

#[tokio::test]
async fn test_harvest_falls_back_to_offline_source() {
    let harvest = StageMock::returning_sequence(vec![
        (200, json!({"content": "", "source_urls": []})),
        (
            200,
            json!({"content": "Curated offline notes on the topic.", "source_urls": []}),
        ),
    ]);
    let (script, voice, notify) = (good_script(), good_voice(), good_notify());
    let harness = Harness::new(endpoints_for(&harvest, &script, &voice, &notify).await).await;

    let outcome = harness.run("ai in healthcare", "req-1").await.unwrap();

    assert_eq!(outcome.status, WorkflowState::Completed);
    assert_eq!(harvest.call_count(), 2);
    let second_request = harvest.last_request.lock().clone().unwrap();
    assert_eq!(second_request["source_mode"], "offline");

    // The script stage received the offline content.
    let script_request = script.last_request.lock().clone().unwrap();
    assert_eq!(script_request["content"], "Curated offline notes on the topic.");
}

#[tokio::test]
async fn test_harvest_exhausting_both_sources_is_fatal() {
    let harvest = StageMock::returning(200, json!({"content": "", "source_urls": []}));
    let (script, voice, notify) = (good_script(), good_voice(), good_notify());
    let harness = Harness::new(endpoints_for(&harvest, &script, &voice, &notify).await).await;

    let outcome = harness.run("ai in healthcare", "req-1").await.unwrap();

    assert_eq!(outcome.status, WorkflowState::Failed);
    assert_eq!(harvest.call_count(), 2);
    assert_eq!(script.call_count(), 0);
}

#[tokio::test]
async fn test_concurrent_duplicate_request_conflicts() {
    let (harvest, script, voice, notify) =
        (good_harvest(), good_script(), good_voice(), good_notify());
    let harness = Harness::new(endpoints_for(&harvest, &script, &voice, &notify).await).await;

    // Another worker already holds a fresh PROCESSING lock on this key.
    harness.idempotency.seed(IdempotencyRecord {
        key: "req-1".to_string(),
        task_name: "generate_podcast".to_string(),
        workflow_id: None,
        status: "processing".to_string(),
        locked_at: Some(Utc::now()),
        result_payload: None,
        error_payload: None,
        created_at: Utc::now(),
    });

    let result = harness.run("ai in healthcare", "req-1").await;

    assert!(matches!(
        result,
        Err(OrchestrationError::IdempotencyConflict { .. })
    ));
    assert_eq!(harvest.call_count(), 0);
}

#[tokio::test]
async fn test_voice_polling_timeout_fails_workflow_and_task() {
    let (harvest, script, notify) = (good_harvest(), good_script(), good_notify());
    let voice = PollingMock::with_statuses(vec![json!({"status": "PENDING"})]);

    let endpoints = StageEndpoints {
        harvest_url: harvest.serve("/harvest").await,
        script_url: script.serve("/weave_script").await,
        voice_url: voice.serve("/synthesize").await,
        notify_url: notify.serve("/notify_stream").await,
        ..StageEndpoints::default()
    };
    let harness = Harness::new(endpoints).await;

    let outcome = harness.run("ai in healthcare", "req-1").await.unwrap();

    assert_eq!(outcome.status, WorkflowState::Failed);
    assert!(outcome
        .error_message
        .as_deref()
        .unwrap()
        .contains("remote-1"));
    assert_eq!(notify.call_count(), 0);

    assert_eq!(
        harness.task_statuses(outcome.workflow_id).await,
        vec![
            ("WCHA".to_string(), "completed".to_string()),
            ("PSWA".to_string(), "completed".to_string()),
            ("VFA".to_string(), "failed".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_retry_after_fatal_failure_resumes_from_failed_stage() {
    let harvest = good_harvest();
    // First attempt: voice reports a hard error. The workflow fails.
    let script = good_script();
    let voice = StageMock::returning_sequence(vec![
        (200, json!({"status": "error", "message": "tts engine down"})),
        (
            200,
            json!({"status": "success", "audio_filepath": "/a.mp3", "stream_id": "st1"}),
        ),
    ]);
    let notify = good_notify();
    let harness = Harness::new(endpoints_for(&harvest, &script, &voice, &notify).await).await;

    let first = harness.run("ai in healthcare", "req-1").await.unwrap();
    assert_eq!(first.status, WorkflowState::Failed);

    // Retrying the whole workflow with the same key replays completed stages
    // and re-executes only the failed voice stage.
    let second = harness.run("ai in healthcare", "req-1").await.unwrap();
    assert_eq!(second.status, WorkflowState::Completed);
    assert_eq!(
        second.final_audio_details.unwrap().audio_filepath,
        "/a.mp3"
    );

    assert_eq!(harvest.call_count(), 1);
    assert_eq!(script.call_count(), 1);
    assert_eq!(voice.call_count(), 2);
    assert_eq!(notify.call_count(), 1);
}

#[tokio::test]
async fn test_topic_discovery_single_operation() {
    let topics = StageMock::returning(
        200,
        json!({"topics": ["ai in healthcare", "ai in education"]}),
    );
    let endpoints = StageEndpoints {
        topic_discovery_url: topics.serve("/discover_topics").await,
        ..StageEndpoints::default()
    };
    let harness = Harness::new(endpoints).await;

    let first = harness
        .orchestrator
        .discover_topics("ai", "discover-1")
        .await
        .unwrap();
    let second = harness
        .orchestrator
        .discover_topics("ai", "discover-1")
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(topics.call_count(), 1);

    let missing_key = harness.orchestrator.discover_topics("ai", "").await;
    assert!(matches!(
        missing_key,
        Err(OrchestrationError::MissingIdempotencyKey { .. })
    ));
}
