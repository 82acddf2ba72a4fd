//! Periodic active health checks
//!
//! Every backend is asked `GET {endpoint}/health`: 200 means up, 503 means
//! degraded, anything else (including no answer) means down. This is the
//! only way a down backend returns to rotation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use switchyard_config::BackendHealthConfig;
use switchyard_core::{BackendProfile, HealthState};
use switchyard_routing::{BackendRegistry, HealthTracker};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::InvokeError;

/// Background prober feeding the shared health tracker
#[derive(Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    registry: Arc<BackendRegistry>,
    health: HealthTracker,
    interval: Duration,
}

impl HealthProbe {
    pub fn new(
        registry: Arc<BackendRegistry>,
        health: HealthTracker,
        config: &BackendHealthConfig,
    ) -> Result<Self, InvokeError> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .map_err(|e| InvokeError::Config(e.to_string()))?;

        Ok(Self {
            client,
            registry,
            health,
            interval: config.probe_interval,
        })
    }

    /// Check one backend
    pub async fn check(&self, profile: &BackendProfile) -> (HealthState, Option<Duration>) {
        let url = format!("{}/health", profile.endpoint.trim_end_matches('/'));
        let started = Instant::now();

        match self.client.get(&url).send().await {
            Ok(response) => {
                let latency = started.elapsed();
                let state = match response.status() {
                    reqwest::StatusCode::OK => HealthState::Up,
                    reqwest::StatusCode::SERVICE_UNAVAILABLE => HealthState::Degraded,
                    _ => HealthState::Down,
                };
                (state, (state != HealthState::Down).then_some(latency))
            }
            Err(e) => {
                tracing::debug!(backend = %profile.id, error = %e, "health probe got no answer");
                (HealthState::Down, None)
            }
        }
    }

    /// Check every registered backend once, concurrently
    pub async fn run_once(&self) {
        let checks = self.registry.profiles().map(|profile| async move {
            let (state, latency) = self.check(profile).await;
            if let Err(e) = self.health.record_probe(&profile.id, state, latency).await {
                tracing::warn!(backend = %profile.id, error = %e, "failed to record probe result");
            }
        });

        futures::future::join_all(checks).await;
    }

    /// Probe on every interval until cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            backends = self.registry.len(),
            interval_secs = self.interval.as_secs(),
            "health probe started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => self.run_once().await,
            }
        }

        tracing::debug!("health probe stopped");
    }
}

impl std::fmt::Debug for HealthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProbe")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
