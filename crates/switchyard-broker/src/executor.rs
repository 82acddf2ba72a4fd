//! Backend execution with failover
//!
//! The best candidate is invoked under its timeout. A failure is recorded
//! against the backend's health, the backend leaves this request's candidate
//! set, and the remainder is ranked again from fresh health data. Admission
//! is never re-checked.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use switchyard_core::{BackendId, BackendProfile, HealthState, Prompt};
use switchyard_routing::{Candidate, HealthTracker, ModelSelector, ScoredBackend};
use switchyard_telemetry::BrokerMetrics;

use crate::backend::{BackendReply, BackendSet};
use crate::InvokeError;

/// Effective weight per candidate, resolved on the first scoring pass
pub struct Weights<'a> {
    resolved: BTreeMap<BackendId, f64>,
    pending: Option<BoxFuture<'a, BTreeMap<BackendId, f64>>>,
}

impl<'a> Weights<'a> {
    pub const fn ready(weights: BTreeMap<BackendId, f64>) -> Self {
        Self {
            resolved: weights,
            pending: None,
        }
    }

    /// Weights computed only if some candidate has to be scored
    pub fn deferred(weights: BoxFuture<'a, BTreeMap<BackendId, f64>>) -> Self {
        Self {
            resolved: BTreeMap::new(),
            pending: Some(weights),
        }
    }

    async fn resolve(&mut self) -> &BTreeMap<BackendId, f64> {
        if let Some(pending) = self.pending.take() {
            self.resolved = pending.await;
        }
        &self.resolved
    }

    /// Resolved weights, empty while still deferred
    fn into_resolved(self) -> BTreeMap<BackendId, f64> {
        self.resolved
    }
}

impl std::fmt::Debug for Weights<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Weights")
            .field("resolved", &self.resolved)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

/// Backends a request may still be sent to
#[derive(Debug)]
pub struct CandidatePool<'a> {
    pub candidates: Vec<&'a BackendProfile>,
    pub weights: Weights<'a>,
    pub priority: u8,
    /// Backend to try first without scoring, from session affinity
    pub pinned: Option<BackendId>,
}

/// A request that some backend served
#[derive(Debug)]
pub struct Execution {
    pub backend: BackendId,
    pub reply: BackendReply,
    pub latency: Duration,
    pub attempts: u32,
    /// Ranking of the first scoring pass, empty when the pinned backend answered
    pub scores: Vec<ScoredBackend>,
    /// Weights used for scoring, empty when nothing was scored
    pub weights: BTreeMap<BackendId, f64>,
}

/// Every candidate failed
#[derive(Debug)]
pub struct Exhausted {
    pub attempts: u32,
    /// Last backend tried and why it failed
    pub last: Option<(BackendId, InvokeError)>,
    pub scores: Vec<ScoredBackend>,
}

/// Invokes backends and walks the failover chain
#[derive(Clone)]
pub struct RequestExecutor {
    backends: BackendSet,
    health: HealthTracker,
    selector: ModelSelector,
    metrics: BrokerMetrics,
}

impl RequestExecutor {
    pub fn new(backends: BackendSet, health: HealthTracker, selector: ModelSelector, metrics: BrokerMetrics) -> Self {
        Self {
            backends,
            health,
            selector,
            metrics,
        }
    }

    /// Run the prompt on the best candidate, failing over until one succeeds
    pub async fn execute(&self, prompt: &Prompt, pool: CandidatePool<'_>) -> Result<Execution, Exhausted> {
        let CandidatePool {
            mut candidates,
            mut weights,
            priority,
            mut pinned,
        } = pool;

        let mut attempts = 0;
        let mut first_scores: Option<Vec<ScoredBackend>> = None;
        let mut last = None;

        loop {
            let pinned_profile = pinned
                .take()
                .and_then(|id| candidates.iter().copied().find(|p| p.id == id));

            let next = match pinned_profile {
                Some(profile) => Some(profile),
                None => {
                    let ranked = self.rank(&candidates, weights.resolve().await, priority).await;
                    let best = ranked
                        .first()
                        .and_then(|s| candidates.iter().copied().find(|p| p.id == s.id));
                    if first_scores.is_none() {
                        first_scores = Some(ranked);
                    }
                    best
                }
            };

            let Some(profile) = next else {
                break;
            };

            attempts += 1;

            match self.invoke(profile, prompt).await {
                Ok((reply, latency)) => {
                    return Ok(Execution {
                        backend: profile.id.clone(),
                        reply,
                        latency,
                        attempts,
                        scores: first_scores.unwrap_or_default(),
                        weights: weights.into_resolved(),
                    });
                }
                Err(e) => {
                    candidates.retain(|p| p.id != profile.id);

                    if !e.is_retryable() {
                        last = Some((profile.id.clone(), e));
                        break;
                    }

                    if !candidates.is_empty() {
                        tracing::warn!(
                            backend = %profile.id,
                            attempt = attempts,
                            remaining = candidates.len(),
                            error = %e,
                            "backend failed, failing over"
                        );
                        self.metrics.failover(profile.id.as_str());
                    }

                    last = Some((profile.id.clone(), e));
                }
            }
        }

        Err(Exhausted {
            attempts,
            last,
            scores: first_scores.unwrap_or_default(),
        })
    }

    /// Rank the remaining candidates against current health
    ///
    /// Backends that went down since admission are dropped. If health cannot
    /// be read the ranking falls back to optimistic defaults rather than
    /// failing the request.
    async fn rank(
        &self,
        candidates: &[&BackendProfile],
        weights: &BTreeMap<BackendId, f64>,
        priority: u8,
    ) -> Vec<ScoredBackend> {
        let ids: Vec<&BackendId> = candidates.iter().map(|p| &p.id).collect();
        let snapshots = match self.health.snapshots(ids).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                tracing::warn!(error = %e, "health read failed, ranking with defaults");
                BTreeMap::new()
            }
        };

        let scored: Vec<Candidate<'_>> = candidates
            .iter()
            .map(|&profile| Candidate {
                profile,
                health: snapshots.get(&profile.id).copied().unwrap_or_default(),
                weight: weights.get(&profile.id).copied().unwrap_or_default(),
            })
            .filter(|candidate| candidate.health.state != HealthState::Down)
            .collect();

        self.selector.rank(&scored, priority)
    }

    /// One bounded call, with its outcome fed back into health tracking
    async fn invoke(&self, profile: &BackendProfile, prompt: &Prompt) -> Result<(BackendReply, Duration), InvokeError> {
        let Some(backend) = self.backends.get(&profile.id) else {
            return Err(InvokeError::Config(format!("backend '{}' has no invoker", profile.id)));
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(profile.timeout, backend.invoke(prompt)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(InvokeError::Timeout(_))) | Err(_) => Err(InvokeError::Timeout(profile.timeout)),
            Ok(Err(e)) => Err(e),
        };
        let latency = started.elapsed();

        self.metrics.attempt(profile.id.as_str(), result.is_ok());

        match result {
            Ok(reply) => {
                tracing::debug!(
                    backend = %profile.id,
                    latency_ms = latency.as_millis(),
                    "backend answered"
                );
                if let Err(e) = self.health.record_success(&profile.id, latency).await {
                    tracing::warn!(backend = %profile.id, error = %e, "failed to record backend success");
                }
                Ok((reply, latency))
            }
            Err(e) => {
                match self.health.record_failure(&profile.id).await {
                    Ok(state) => tracing::warn!(
                        backend = %profile.id,
                        latency_ms = latency.as_millis(),
                        health = %state,
                        error = %e,
                        "backend invocation failed"
                    ),
                    Err(store) => {
                        tracing::warn!(backend = %profile.id, error = %store, "failed to record backend failure");
                    }
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
