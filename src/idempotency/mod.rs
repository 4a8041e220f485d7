//! # Idempotent Task Wrapper
//!
//! The single primitive every side-effecting operation funnels through:
//! check the record, acquire the PROCESSING lock, run the body, store the
//! result. On a COMPLETED hit the body is never invoked and the stored
//! payload is returned verbatim; the underlying collaborator calls are costly
//! and not idempotent themselves.

use std::future::Future;

use tracing::{debug, warn};

use crate::models::IdempotencyStatus;
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::storage::{AcquireOutcome, IdempotencyStore};

/// Execute `body` at most once to a visible-success conclusion for the given
/// `(key, task_name)` pair.
///
/// Protocol:
/// 1. Missing key → [`OrchestrationError::MissingIdempotencyKey`].
/// 2. COMPLETED record → stored payload, body not invoked.
/// 3. PROCESSING record with a fresh lock → [`OrchestrationError::IdempotencyConflict`].
/// 4. Otherwise acquire (UPSERT backstop may still report a conflict), run
///    the body, then mark COMPLETED or FAILED.
///
/// A body failure is recorded best-effort before the error propagates, so a
/// later retry can re-acquire; storage failures while recording are logged
/// and do not mask the primary error.
pub async fn run_idempotent<F, Fut>(
    store: &dyn IdempotencyStore,
    key: &str,
    task_name: &str,
    workflow_id: Option<&str>,
    body: F,
) -> OrchestrationResult<serde_json::Value>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = OrchestrationResult<serde_json::Value>>,
{
    if key.trim().is_empty() {
        return Err(OrchestrationError::MissingIdempotencyKey {
            task_name: task_name.to_string(),
        });
    }

    if let Some(record) = store.check(key, task_name).await? {
        match record.parsed_status() {
            Ok(IdempotencyStatus::Completed) => {
                debug!(
                    key = %key,
                    task_name = %task_name,
                    "idempotency replay, returning stored payload"
                );
                return Ok(record.result_payload.unwrap_or(serde_json::Value::Null));
            }
            Ok(IdempotencyStatus::Processing)
                if !record.is_lock_expired(store.lock_timeout()) =>
            {
                return Err(OrchestrationError::IdempotencyConflict {
                    key: key.to_string(),
                    task_name: task_name.to_string(),
                    locked_at: record.locked_at,
                });
            }
            // FAILED, stale PROCESSING, or an unparseable status all fall
            // through to the acquire attempt.
            _ => {}
        }
    }

    match store.acquire(key, task_name, workflow_id).await? {
        AcquireOutcome::Acquired => {}
        AcquireOutcome::Conflict { locked_at } => {
            return Err(OrchestrationError::IdempotencyConflict {
                key: key.to_string(),
                task_name: task_name.to_string(),
                locked_at,
            });
        }
    }

    match body().await {
        Ok(payload) => {
            store.complete(key, task_name, &payload).await?;
            Ok(payload)
        }
        Err(error) => {
            let error_payload = error.to_error_payload();
            if let Err(store_error) = store.fail(key, task_name, &error_payload).await {
                warn!(
                    key = %key,
                    task_name = %task_name,
                    error = %store_error,
                    "failed to record idempotency failure"
                );
            }
            Err(error)
        }
    }
}
