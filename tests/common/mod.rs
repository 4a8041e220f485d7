//! Shared test fixtures: mock collaborator services served on ephemeral
//! ports, exercising the same HTTP protocol as production stage services.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Serve a router on an ephemeral port, returning its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Reserve an address nothing listens on (connection refused).
pub async fn unreachable_url(path: &str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}{path}")
}

/// A synchronous mock stage: counts submits, records the last request body,
/// and answers from a response queue (the final entry repeats).
#[derive(Clone)]
pub struct StageMock {
    pub calls: Arc<AtomicUsize>,
    pub last_request: Arc<Mutex<Option<Value>>>,
    responses: Arc<Mutex<VecDeque<(u16, Value)>>>,
}

impl StageMock {
    pub fn returning(status: u16, body: Value) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back((status, body));
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(Mutex::new(None)),
            responses: Arc::new(Mutex::new(queue)),
        }
    }

    pub fn returning_sequence(responses: Vec<(u16, Value)>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(Mutex::new(None)),
            responses: Arc::new(Mutex::new(responses.into_iter().collect())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn handle(State(mock): State<StageMock>, Json(body): Json<Value>) -> impl IntoResponse {
        mock.calls.fetch_add(1, Ordering::SeqCst);
        *mock.last_request.lock() = Some(body);
        let (status, value) = {
            let mut queue = mock.responses.lock();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap_or((200, json!({})))
            }
        };
        (StatusCode::from_u16(status).unwrap(), Json(value))
    }

    pub fn router(&self, path: &str) -> Router {
        Router::new()
            .route(path, post(Self::handle))
            .with_state(self.clone())
    }

    /// Convenience: serve this mock alone and return its submit URL.
    pub async fn serve(&self, path: &str) -> String {
        let base = spawn_server(self.router(path)).await;
        format!("{base}{path}")
    }
}

/// An asynchronous mock stage: submit answers `202 {task_id, status_url}`,
/// the status endpoint answers from a queue of poll bodies (final repeats).
#[derive(Clone)]
pub struct PollingMock {
    pub submit_calls: Arc<AtomicUsize>,
    pub poll_calls: Arc<AtomicUsize>,
    statuses: Arc<Mutex<VecDeque<Value>>>,
}

impl PollingMock {
    pub fn with_statuses(statuses: Vec<Value>) -> Self {
        Self {
            submit_calls: Arc::new(AtomicUsize::new(0)),
            poll_calls: Arc::new(AtomicUsize::new(0)),
            statuses: Arc::new(Mutex::new(statuses.into_iter().collect())),
        }
    }

    async fn submit(State(mock): State<PollingMock>, Json(_body): Json<Value>) -> impl IntoResponse {
        mock.submit_calls.fetch_add(1, Ordering::SeqCst);
        (
            StatusCode::ACCEPTED,
            Json(json!({"task_id": "remote-1", "status_url": "/status/remote-1"})),
        )
    }

    async fn status(State(mock): State<PollingMock>) -> impl IntoResponse {
        mock.poll_calls.fetch_add(1, Ordering::SeqCst);
        let body = {
            let mut queue = mock.statuses.lock();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap_or(json!({"status": "PENDING"}))
            }
        };
        Json(body)
    }

    pub fn router(&self, submit_path: &str) -> Router {
        Router::new()
            .route(submit_path, post(Self::submit))
            .route("/status/remote-1", get(Self::status))
            .with_state(self.clone())
    }

    pub async fn serve(&self, submit_path: &str) -> String {
        let base = spawn_server(self.router(submit_path)).await;
        format!("{base}{submit_path}")
    }
}
