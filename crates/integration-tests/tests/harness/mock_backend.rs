//! Mock inference backend for integration tests
//!
//! Speaks the generic JSON protocol on `POST /` and answers probes on
//! `GET /health`. Failures, latency and the probe status can be changed
//! while the server runs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use tokio_util::sync::CancellationToken;

/// Mock backend that answers with its own name
pub struct MockBackend {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    name: String,
    invoke_count: AtomicU32,
    probe_count: AtomicU32,
    /// Number of requests to fail before succeeding
    fail_count: AtomicU32,
    /// Fail every request regardless of `fail_count`
    always_fail: AtomicBool,
    delay_ms: AtomicU64,
    health_status: AtomicU16,
}

impl MockBackend {
    pub async fn start(name: &str) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            name: name.to_owned(),
            invoke_count: AtomicU32::new(0),
            probe_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(0),
            always_fail: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            health_status: AtomicU16::new(200),
        });

        let app = Router::new()
            .route("/", routing::post(handle_invoke))
            .route("/health", routing::get(handle_health))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Start a backend that answers with 500 until told otherwise
    pub async fn start_failing(name: &str) -> anyhow::Result<Self> {
        let mock = Self::start(name).await?;
        mock.fail_always(true);
        Ok(mock)
    }

    /// Start a backend that takes `delay` to answer
    pub async fn start_slow(name: &str, delay: Duration) -> anyhow::Result<Self> {
        let mock = Self::start(name).await?;
        mock.set_delay(delay);
        Ok(mock)
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn invoke_count(&self) -> u32 {
        self.state.invoke_count.load(Ordering::Relaxed)
    }

    pub fn probe_count(&self) -> u32 {
        self.state.probe_count.load(Ordering::Relaxed)
    }

    /// Fail the next `n` requests with 500
    pub fn fail_next(&self, n: u32) {
        self.state.fail_count.store(n, Ordering::Relaxed);
    }

    pub fn fail_always(&self, fail: bool) {
        self.state.always_fail.store(fail, Ordering::Relaxed);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap(), Ordering::Relaxed);
    }

    /// Status returned by `GET /health`
    pub fn set_health_status(&self, status: u16) {
        self.state.health_status.store(status, Ordering::Relaxed);
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_invoke(State(state): State<Arc<MockState>>, Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    state.invoke_count.fetch_add(1, Ordering::Relaxed);

    let delay = state.delay_ms.load(Ordering::Relaxed);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let should_fail = state.always_fail.load(Ordering::Relaxed)
        || state
            .fail_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();

    if should_fail {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": format!("{} is failing", state.name) })),
        );
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "output": format!("answer from {}", state.name),
            "echo": body["prompt"],
        })),
    )
}

async fn handle_health(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.probe_count.fetch_add(1, Ordering::Relaxed);
    let status = StatusCode::from_u16(state.health_status.load(Ordering::Relaxed)).unwrap_or(StatusCode::OK);
    (status, "ok")
}
