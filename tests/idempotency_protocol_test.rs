//! Idempotent task wrapper protocol tests: replay, conflict, stale-lock
//! recovery, and retry-after-failure semantics over the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use podcast_core::idempotency::run_idempotent;
use podcast_core::models::IdempotencyRecord;
use podcast_core::orchestration::errors::{LogicalErrorKind, OrchestrationError};
use podcast_core::storage::{IdempotencyStore, InMemoryIdempotencyStore};

fn store() -> InMemoryIdempotencyStore {
    InMemoryIdempotencyStore::new(Duration::from_secs(300))
}

fn processing_record(key: &str, task_name: &str, locked_at_secs_ago: i64) -> IdempotencyRecord {
    IdempotencyRecord {
        key: key.to_string(),
        task_name: task_name.to_string(),
        workflow_id: None,
        status: "processing".to_string(),
        locked_at: Some(Utc::now() - ChronoDuration::seconds(locked_at_secs_ago)),
        result_payload: None,
        error_payload: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_idempotent_replay_runs_body_once() {
    let store = store();
    let invocations = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let counter = invocations.clone();
        let result = run_idempotent(&store, "req-1", "WCHA", Some("wf-1"), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"content": "harvested text"}))
        })
        .await
        .unwrap();
        assert_eq!(result, json!({"content": "harvested text"}));
    }

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    let record = store.snapshot("req-1", "WCHA").unwrap();
    assert_eq!(record.status, "completed");
    assert!(record.locked_at.is_none());
}

#[tokio::test]
async fn test_fresh_processing_lock_conflicts_without_running_body() {
    let store = store();
    store.seed(processing_record("req-1", "WCHA", 5));

    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();
    let result = run_idempotent(&store, "req-1", "WCHA", None, move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!({}))
    })
    .await;

    assert!(matches!(
        result,
        Err(OrchestrationError::IdempotencyConflict { .. })
    ));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stale_lock_is_reacquired_and_body_runs_once() {
    let store = InMemoryIdempotencyStore::new(Duration::from_secs(60));
    store.seed(processing_record("req-1", "VFA", 600));

    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();
    let result = run_idempotent(&store, "req-1", "VFA", None, move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"status": "success", "audio_filepath": "/a.mp3", "stream_id": "st1"}))
    })
    .await
    .unwrap();

    assert_eq!(result["audio_filepath"], "/a.mp3");
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(store.snapshot("req-1", "VFA").unwrap().status, "completed");
}

#[tokio::test]
async fn test_retry_after_failure_reexecutes_body() {
    let store = store();
    let invocations = Arc::new(AtomicUsize::new(0));

    let counter = invocations.clone();
    let first = run_idempotent(&store, "req-1", "PSWA", None, move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(OrchestrationError::CollaboratorLogical {
            kind: LogicalErrorKind::Error,
            message: "script weaving failed".to_string(),
            detail: json!({}),
        })
    })
    .await;
    assert!(first.is_err());

    let record = store.snapshot("req-1", "PSWA").unwrap();
    assert_eq!(record.status, "failed");
    assert_eq!(
        record.error_payload.unwrap()["error_type"],
        "collaborator_logical_error"
    );

    let counter = invocations.clone();
    let second = run_idempotent(&store, "req-1", "PSWA", None, move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"script_id": "s1"}))
    })
    .await
    .unwrap();

    assert_eq!(second, json!({"script_id": "s1"}));
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
    assert_eq!(store.snapshot("req-1", "PSWA").unwrap().status, "completed");
}

#[tokio::test]
async fn test_missing_key_is_rejected_before_any_store_access() {
    let store = store();
    let result = run_idempotent(&store, "  ", "WCHA", None, || async {
        Ok(json!({}))
    })
    .await;

    assert!(matches!(
        result,
        Err(OrchestrationError::MissingIdempotencyKey { .. })
    ));
    assert!(store.check("  ", "WCHA").await.unwrap().is_none());
}

#[tokio::test]
async fn test_same_key_different_task_names_are_independent() {
    let store = store();
    for task_name in ["WCHA", "PSWA"] {
        run_idempotent(&store, "req-1", task_name, None, || async move {
            Ok(json!({"task": task_name}))
        })
        .await
        .unwrap();
    }

    assert_eq!(
        store.snapshot("req-1", "WCHA").unwrap().result_payload,
        Some(json!({"task": "WCHA"}))
    );
    assert_eq!(
        store.snapshot("req-1", "PSWA").unwrap().result_payload,
        Some(json!({"task": "PSWA"}))
    );
}
