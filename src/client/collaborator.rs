//! # Async Collaborator Client
//!
//! Generic submit-then-poll client used for every stage collaborator. Only
//! the submit payload shape and result field names differ between stages;
//! those live in the stage parsers, not here.
//!
//! Submit: POST with bounded timeout, retried with exponential backoff on
//! transport errors and 5xx. A `200` is a finished synchronous result; a
//! `202` carries `{task_id, status_url}` and starts the polling loop.

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::HttpClientConfig;
use crate::constants::headers;
use crate::orchestration::errors::{LogicalErrorKind, OrchestrationError, OrchestrationResult};

/// Correlation headers attached to every submit request.
#[derive(Debug, Clone, Copy)]
pub struct CallHeaders<'a> {
    pub idempotency_key: &'a str,
    pub workflow_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SubmitAccepted {
    task_id: String,
    status_url: String,
}

#[derive(Debug, Deserialize)]
struct PollBody {
    status: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Clone)]
pub struct AsyncCollaboratorClient {
    http: reqwest::Client,
    config: HttpClientConfig,
}

impl AsyncCollaboratorClient {
    pub fn new(config: HttpClientConfig) -> OrchestrationResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| OrchestrationError::Configuration {
                config_source: "http_client".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http, config })
    }

    /// Submit a unit of work and wait for its result.
    pub async fn call(
        &self,
        submit_url: &str,
        payload: &Value,
        call_headers: CallHeaders<'_>,
    ) -> OrchestrationResult<Value> {
        let response = self
            .submit_with_retry(submit_url, payload, call_headers)
            .await?;
        let status = response.status();

        match status {
            // Synchronous/cached path: the body is the result.
            StatusCode::OK => {
                response
                    .json::<Value>()
                    .await
                    .map_err(|e| OrchestrationError::CollaboratorLogical {
                        kind: LogicalErrorKind::Malformed,
                        message: format!("collaborator 200 body was not JSON: {e}"),
                        detail: Value::Null,
                    })
            }
            StatusCode::ACCEPTED => {
                let body: Value = response.json().await.map_err(|e| {
                    OrchestrationError::CollaboratorLogical {
                        kind: LogicalErrorKind::Malformed,
                        message: format!("collaborator 202 body was not JSON: {e}"),
                        detail: Value::Null,
                    }
                })?;
                let accepted: SubmitAccepted =
                    serde_json::from_value(body.clone()).map_err(|e| {
                        OrchestrationError::CollaboratorLogical {
                            kind: LogicalErrorKind::Malformed,
                            message: format!("collaborator 202 body missing task handle: {e}"),
                            detail: body,
                        }
                    })?;
                let status_url = resolve_status_url(submit_url, &accepted.status_url)?;
                debug!(
                    remote_task_id = %accepted.task_id,
                    status_url = %status_url,
                    "collaborator accepted work, polling"
                );
                self.poll(status_url, &accepted.task_id).await
            }
            other => {
                let body = response.text().await.unwrap_or_default();
                Err(OrchestrationError::CollaboratorRequest {
                    url: submit_url.to_string(),
                    status: other.as_u16(),
                    body,
                })
            }
        }
    }

    async fn submit_with_retry(
        &self,
        submit_url: &str,
        payload: &Value,
        call_headers: CallHeaders<'_>,
    ) -> OrchestrationResult<reqwest::Response> {
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            let mut request = self
                .http
                .post(submit_url)
                .header(headers::IDEMPOTENCY_KEY, call_headers.idempotency_key)
                .json(payload);
            if let Some(workflow_id) = call_headers.workflow_id {
                request = request.header(headers::WORKFLOW_ID, workflow_id);
            }

            let failure_reason = match request.send().await {
                Ok(response) if response.status().is_server_error() => {
                    format!("server error {}", response.status())
                }
                Ok(response) => return Ok(response),
                Err(e) => e.to_string(),
            };

            if attempt >= max_retries {
                return Err(OrchestrationError::CollaboratorUnavailable {
                    url: submit_url.to_string(),
                    attempts: attempt + 1,
                    reason: failure_reason,
                });
            }

            let delay = self.config.backoff_delay(attempt);
            warn!(
                url = %submit_url,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                reason = %failure_reason,
                "collaborator submit failed, backing off"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn poll(&self, status_url: Url, remote_task_id: &str) -> OrchestrationResult<Value> {
        let poll_interval = self.config.poll_interval();
        let poll_timeout = self.config.poll_timeout();
        let deadline = Instant::now() + poll_timeout;

        loop {
            match self.http.get(status_url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    let body: PollBody = response.json().await.map_err(|e| {
                        OrchestrationError::CollaboratorLogical {
                            kind: LogicalErrorKind::Malformed,
                            message: format!("status body for task {remote_task_id} invalid: {e}"),
                            detail: Value::Null,
                        }
                    })?;
                    match body.status.to_ascii_uppercase().as_str() {
                        "SUCCESS" => return Ok(body.result.unwrap_or(Value::Null)),
                        "FAILURE" => {
                            return Err(OrchestrationError::CollaboratorLogical {
                                kind: LogicalErrorKind::Error,
                                message: format!("remote task {remote_task_id} failed"),
                                detail: body.error.or(body.result).unwrap_or(Value::Null),
                            })
                        }
                        // PENDING / PROCESSING: keep waiting.
                        _ => {}
                    }
                }
                Ok(response) => {
                    warn!(
                        remote_task_id = %remote_task_id,
                        status = %response.status(),
                        "status poll returned non-success, retrying"
                    );
                }
                Err(e) => {
                    warn!(
                        remote_task_id = %remote_task_id,
                        error = %e,
                        "status poll transport error, retrying"
                    );
                }
            }

            if Instant::now() + poll_interval >= deadline {
                return Err(OrchestrationError::PollingTimeout {
                    remote_task_id: remote_task_id.to_string(),
                    timeout: poll_timeout,
                });
            }
            sleep(poll_interval).await;
        }
    }
}

/// Resolve a possibly-relative status URL against the submit URL.
fn resolve_status_url(submit_url: &str, status_url: &str) -> OrchestrationResult<Url> {
    let base = Url::parse(submit_url).map_err(|e| OrchestrationError::Validation {
        field: "submit_url".to_string(),
        reason: format!("{submit_url}: {e}"),
    })?;
    base.join(status_url).map_err(|e| OrchestrationError::Validation {
        field: "status_url".to_string(),
        reason: format!("{status_url}: {e}"),
    })
}
