//! Observed backend health
//!
//! Per-backend counters live in the shared store so every broker instance
//! sees the same picture. Failures drive state transitions: `degraded_after`
//! consecutive failures degrade a backend, `down_after` take it out of
//! rotation. Only a probe brings a down backend back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use switchyard_config::BackendHealthConfig;
use switchyard_core::{BackendId, HealthSnapshot, HealthState};
use switchyard_store::Store;

use crate::RoutingError;

/// Shared per-backend health statistics
#[derive(Clone)]
pub struct HealthTracker {
    store: Arc<dyn Store>,
    config: BackendHealthConfig,
}

struct Keys {
    state: String,
    total: String,
    failed: String,
    consecutive: String,
    latency_sum: String,
    latency_samples: String,
}

impl Keys {
    fn new(backend: &BackendId) -> Self {
        let base = format!("health:{backend}");
        Self {
            state: format!("{base}:state"),
            total: format!("{base}:total"),
            failed: format!("{base}:failed"),
            consecutive: format!("{base}:consecutive"),
            latency_sum: format!("{base}:latency_sum_ms"),
            latency_samples: format!("{base}:latency_samples"),
        }
    }
}

fn millis(latency: Duration) -> i64 {
    i64::try_from(latency.as_millis()).unwrap_or(i64::MAX)
}

impl HealthTracker {
    pub fn new(store: Arc<dyn Store>, config: BackendHealthConfig) -> Self {
        Self { store, config }
    }

    pub const fn config(&self) -> &BackendHealthConfig {
        &self.config
    }

    async fn add_latency(&self, keys: &Keys, latency: Duration) -> Result<(), RoutingError> {
        self.store.incr(&keys.latency_sum, millis(latency), None).await?;
        self.store.incr(&keys.latency_samples, 1, None).await?;
        Ok(())
    }

    /// Current state, `Up` when never recorded
    pub async fn state(&self, backend: &BackendId) -> Result<HealthState, RoutingError> {
        let raw = self.store.get(&Keys::new(backend).state).await?;
        Ok(raw.and_then(|s| s.parse().ok()).unwrap_or_default())
    }

    /// Move the state from `from` to `to` only while it still reads `from`
    async fn transition(&self, keys: &Keys, from: HealthState, to: HealthState) -> Result<bool, RoutingError> {
        let store = self.store.as_ref();
        if store.compare_and_set(&keys.state, Some(from.as_str()), to.as_str()).await? {
            return Ok(true);
        }

        // a never-written state reads as up
        Ok(from == HealthState::Up && store.compare_and_set(&keys.state, None, to.as_str()).await?)
    }

    /// Replace the state and return the one it replaced
    async fn swap_state(&self, keys: &Keys, state: HealthState) -> Result<HealthState, RoutingError> {
        let previous = self.store.swap(&keys.state, state.as_str()).await?;
        Ok(previous.and_then(|s| s.parse().ok()).unwrap_or_default())
    }

    /// Record a successful invocation
    ///
    /// Lifts a degraded backend back to up. A backend that went down in the
    /// meantime stays down.
    pub async fn record_success(&self, backend: &BackendId, latency: Duration) -> Result<(), RoutingError> {
        let keys = Keys::new(backend);

        self.store.incr(&keys.total, 1, None).await?;
        self.add_latency(&keys, latency).await?;
        self.store.delete(&keys.consecutive).await?;

        if self.transition(&keys, HealthState::Degraded, HealthState::Up).await? {
            tracing::info!(%backend, "backend recovered");
        }

        Ok(())
    }

    /// Record a failed invocation and return the resulting state
    pub async fn record_failure(&self, backend: &BackendId) -> Result<HealthState, RoutingError> {
        let keys = Keys::new(backend);

        self.store.incr(&keys.total, 1, None).await?;
        self.store.incr(&keys.failed, 1, None).await?;
        let streak = self
            .store
            .incr(&keys.consecutive, 1, Some(self.config.failure_window))
            .await?;

        if streak >= i64::from(self.config.down_after) {
            let previous = self.swap_state(&keys, HealthState::Down).await?;
            if previous != HealthState::Down {
                tracing::warn!(%backend, from = %previous, to = %HealthState::Down, consecutive_failures = streak, "backend health changed");
            }
            return Ok(HealthState::Down);
        }

        if streak >= i64::from(self.config.degraded_after)
            && self.transition(&keys, HealthState::Up, HealthState::Degraded).await?
        {
            tracing::warn!(%backend, from = %HealthState::Up, to = %HealthState::Degraded, consecutive_failures = streak, "backend health changed");
            return Ok(HealthState::Degraded);
        }

        self.state(backend).await
    }

    /// Apply the outcome of an active probe
    ///
    /// A reachable backend also has its failure streak cleared.
    pub async fn record_probe(
        &self,
        backend: &BackendId,
        state: HealthState,
        latency: Option<Duration>,
    ) -> Result<(), RoutingError> {
        let keys = Keys::new(backend);
        let previous = self.swap_state(&keys, state).await?;

        if state != HealthState::Down {
            self.store.delete(&keys.consecutive).await?;
        }
        if let Some(latency) = latency {
            self.add_latency(&keys, latency).await?;
        }

        if previous != state {
            tracing::info!(%backend, from = %previous, to = %state, "probe changed backend health");
        }

        Ok(())
    }

    /// Statistics for one backend
    #[allow(clippy::cast_precision_loss)]
    pub async fn snapshot(&self, backend: &BackendId) -> Result<HealthSnapshot, RoutingError> {
        let keys = Keys::new(backend);
        let store = self.store.as_ref();
        let defaults = HealthSnapshot::default();

        let counter = |key: String| async move {
            switchyard_store::get_counter(store, &key).await.map(|v| v.unwrap_or(0).max(0))
        };

        let total = counter(keys.total).await?;
        let failed = counter(keys.failed).await?;
        let consecutive = counter(keys.consecutive).await?;
        let latency_sum = counter(keys.latency_sum).await?;
        let latency_samples = counter(keys.latency_samples).await?;

        let avg_latency_ms = if latency_samples == 0 {
            defaults.avg_latency_ms
        } else {
            latency_sum as f64 / latency_samples as f64
        };

        let success_rate = if total == 0 {
            defaults.success_rate
        } else {
            (total - failed.min(total)) as f64 / total as f64 * 100.0
        };

        Ok(HealthSnapshot {
            state: self.state(backend).await?,
            avg_latency_ms,
            success_rate,
            consecutive_failures: u32::try_from(consecutive).unwrap_or(u32::MAX),
            total_requests: u64::try_from(total).unwrap_or(0),
            failed_requests: u64::try_from(failed).unwrap_or(0),
        })
    }

    /// Statistics for several backends
    pub async fn snapshots<'a>(
        &self,
        backends: impl IntoIterator<Item = &'a BackendId>,
    ) -> Result<BTreeMap<BackendId, HealthSnapshot>, RoutingError> {
        let mut out = BTreeMap::new();
        for backend in backends {
            out.insert(backend.clone(), self.snapshot(backend).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use switchyard_store::MemoryStore;

    use super::*;

    fn tracker() -> HealthTracker {
        HealthTracker::new(Arc::new(MemoryStore::new("t")), BackendHealthConfig::default())
    }

    #[tokio::test]
    async fn unknown_backend_has_optimistic_defaults() {
        let snapshot = tracker().snapshot(&"new".into()).await.unwrap();
        assert_eq!(snapshot, HealthSnapshot::default());
    }

    #[tokio::test]
    async fn averages_latency_and_success() {
        let tracker = tracker();
        let id = BackendId::from("b");

        tracker.record_success(&id, Duration::from_millis(100)).await.unwrap();
        tracker.record_success(&id, Duration::from_millis(300)).await.unwrap();
        tracker.record_failure(&id).await.unwrap();
        tracker.record_success(&id, Duration::from_millis(200)).await.unwrap();

        let snapshot = tracker.snapshot(&id).await.unwrap();
        assert!((snapshot.avg_latency_ms - 200.0).abs() < 1e-9);
        assert!((snapshot.success_rate - 75.0).abs() < 1e-9);
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn consecutive_failures_degrade_then_take_down() {
        let tracker = tracker();
        let id = BackendId::from("b");

        assert_eq!(tracker.record_failure(&id).await.unwrap(), HealthState::Up);
        assert_eq!(tracker.record_failure(&id).await.unwrap(), HealthState::Up);
        assert_eq!(tracker.record_failure(&id).await.unwrap(), HealthState::Degraded);
        assert_eq!(tracker.record_failure(&id).await.unwrap(), HealthState::Degraded);
        assert_eq!(tracker.record_failure(&id).await.unwrap(), HealthState::Down);
        assert_eq!(tracker.state(&id).await.unwrap(), HealthState::Down);
    }

    #[tokio::test]
    async fn success_breaks_the_streak_and_recovers_degraded() {
        let tracker = tracker();
        let id = BackendId::from("b");

        for _ in 0..3 {
            tracker.record_failure(&id).await.unwrap();
        }
        assert_eq!(tracker.state(&id).await.unwrap(), HealthState::Degraded);

        tracker.record_success(&id, Duration::from_millis(50)).await.unwrap();
        assert_eq!(tracker.state(&id).await.unwrap(), HealthState::Up);

        assert_eq!(tracker.record_failure(&id).await.unwrap(), HealthState::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn late_outcomes_never_lift_a_down_backend() {
        let tracker = tracker();
        let id = BackendId::from("b");

        for _ in 0..3 {
            tracker.record_failure(&id).await.unwrap();
        }
        assert_eq!(tracker.state(&id).await.unwrap(), HealthState::Degraded);
        for _ in 0..2 {
            tracker.record_failure(&id).await.unwrap();
        }

        // a success that was in flight while the backend went down
        tracker.record_success(&id, Duration::from_millis(50)).await.unwrap();
        assert_eq!(tracker.state(&id).await.unwrap(), HealthState::Down);

        // a fresh streak reaching the degraded threshold does not demote down to degraded
        tokio::time::advance(Duration::from_secs(61)).await;
        for _ in 0..3 {
            assert_eq!(tracker.record_failure(&id).await.unwrap(), HealthState::Down);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failures_outside_the_window_do_not_accumulate() {
        let tracker = tracker();
        let id = BackendId::from("b");

        tracker.record_failure(&id).await.unwrap();
        tracker.record_failure(&id).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(tracker.record_failure(&id).await.unwrap(), HealthState::Up);
    }

    #[tokio::test]
    async fn probe_restores_down_backend() {
        let tracker = tracker();
        let id = BackendId::from("b");

        for _ in 0..5 {
            tracker.record_failure(&id).await.unwrap();
        }
        assert_eq!(tracker.state(&id).await.unwrap(), HealthState::Down);

        tracker
            .record_probe(&id, HealthState::Up, Some(Duration::from_millis(20)))
            .await
            .unwrap();

        let snapshot = tracker.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.state, HealthState::Up);
        assert_eq!(snapshot.consecutive_failures, 0);
    }
}
