//! HTTP surface of the Switchyard broker
//!
//! `POST /v1/infer` runs the inference pipeline for the bearer credential;
//! `/internal/*` exposes backend health and subscription counters to
//! dashboards.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod error;
mod health;
mod infer;
mod internal;

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use switchyard_billing::UsageRecorder;
use switchyard_broker::Broker;
use switchyard_config::{BackendHealthConfig, Config};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    broker: Broker,
    health: BackendHealthConfig,
}

impl Server {
    /// Build the broker and its collaborators from configuration
    ///
    /// Must run inside a Tokio runtime: the usage recorder spawns its
    /// delivery task here.
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let store = switchyard_store::connect(&config.store)
            .await
            .context("failed to connect to the shared store")?;

        let sink = switchyard_billing::build_sink(&config.usage.ledger).context("failed to initialize usage ledger")?;
        let recorder = UsageRecorder::spawn(sink, &config.usage);

        let broker = Broker::from_config(config, store, recorder)?;

        Ok(Self::with_broker(config, broker))
    }

    /// Wrap an already assembled broker
    pub fn with_broker(config: &Config, broker: Broker) -> Self {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let mut app = Router::new().route("/v1/infer", post(infer::infer_handler));

        if config.server.internal_routes {
            app = app
                .route("/internal/backends", get(internal::backends_handler))
                .route(
                    "/internal/subscriptions/{id}/counters",
                    get(internal::counters_handler),
                );
        }

        let mut app = app.with_state(broker.clone());

        if config.server.health.enabled {
            app = app.route(&config.server.health.path, get(health::health_handler));
        }

        let router = app.layer(TraceLayer::new_for_http());

        Self {
            router,
            listen_address,
            broker,
            health: config.health,
        }
    }

    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Runs the backend health probe alongside the listener. Blocks until the
    /// cancellation token is triggered, then drains queued usage records.
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address)
            .await
            .with_context(|| format!("failed to bind {}", self.listen_address))?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(self, listener: tokio::net::TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        let probe_shutdown = shutdown.child_token();
        let probe = if self.health.probe_enabled {
            let probe = self
                .broker
                .health_probe(&self.health)
                .context("failed to initialize health probe")?;
            Some(tokio::spawn(probe.run(probe_shutdown.clone())))
        } else {
            None
        };

        let recorder = self.broker.recorder().clone();

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        probe_shutdown.cancel();
        if let Some(probe) = probe
            && let Err(e) = probe.await
        {
            tracing::warn!(error = %e, "health probe task failed");
        }

        if let Err(e) = recorder.flush().await {
            tracing::error!(error = %e, "failed to flush usage records on shutdown");
        }

        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen_address", &self.listen_address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use http::{Request, StatusCode};
    use indoc::indoc;
    use switchyard_billing::LogLedger;
    use switchyard_store::MemoryStore;
    use tower::ServiceExt;

    use super::*;

    const CONFIG: &str = indoc! {r#"
        [auth.directory]
        type = "static"

        [auth.directory.subscriptions.acme]
        plan = "pro"

        [[auth.directory.credentials]]
        key = "sk-acme"
        subscription = "acme"

        [backends.local]
        type = "http"
        endpoint = "http://127.0.0.1:9"
        tier = "fast"

        [plans.pro]
        qps = 5
        daily_quota = 100
        backends = ["local"]
    "#};

    fn router(raw: &str) -> Router {
        let config = Config::parse(raw).unwrap();
        let recorder = UsageRecorder::spawn(Arc::new(LogLedger), &config.usage);
        let broker = Broker::from_config(&config, Arc::new(MemoryStore::new("t")), recorder).unwrap();
        Server::with_broker(&config, broker).into_router()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    fn infer(credential: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post("/v1/infer").header(http::header::CONTENT_TYPE, "application/json");
        if let Some(credential) = credential {
            builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {credential}"));
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    #[tokio::test]
    async fn health_route_answers() {
        let response = router(CONFIG)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_credential_is_unauthorized() {
        let (status, body) = send(router(CONFIG), infer(None, r#"{"prompt": "hi"}"#)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "unauthorized");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (status, body) = send(router(CONFIG), infer(Some("sk-acme"), r#"{"prompt": 42}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request");
    }

    #[tokio::test]
    async fn counters_need_a_known_plan() {
        let router = router(CONFIG);

        let missing = Request::get("/internal/subscriptions/acme/counters").body(Body::empty()).unwrap();
        let (status, _) = send(router.clone(), missing).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unknown = Request::get("/internal/subscriptions/acme/counters?plan=gold")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(router.clone(), unknown).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let known = Request::get("/internal/subscriptions/acme/counters?plan=pro")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router, known).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quota_remaining"], 100);
        assert_eq!(body["rate_tokens_remaining"], 5);
    }

    #[tokio::test]
    async fn backend_listing_includes_health() {
        let request = Request::get("/internal/backends").body(Body::empty()).unwrap();
        let (status, body) = send(router(CONFIG), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "local");
        assert_eq!(body[0]["health"]["state"], "up");
    }

    #[tokio::test]
    async fn internal_routes_can_be_disabled() {
        let raw = format!("[server]\ninternal_routes = false\n\n{CONFIG}");
        let request = Request::get("/internal/backends").body(Body::empty()).unwrap();
        let (status, _) = send(router(&raw), request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
