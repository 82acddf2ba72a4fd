//! Eligibility and ranking
//!
//! ```text
//! score = latency / (avg_latency_ms + 1)
//!       + capacity * capacity_score / 100
//!       - cost * cost_per_unit
//!       + priority * subscriber_priority
//!       + success * success_rate / 100
//!       + cost_weight * effective_weight / 10
//!       + degraded_penalty (when degraded)
//! ```
//!
//! Ties go to the lower average latency, then the lexically smaller id.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use switchyard_config::ScoringConfig;
use switchyard_core::{BackendId, BackendProfile, HealthSnapshot, HealthState, SubscriptionContext};

use crate::BackendRegistry;

/// An eligible backend with everything needed to score it
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub profile: &'a BackendProfile,
    pub health: HealthSnapshot,
    /// Override weight when one applies, else the plan's static weight
    pub weight: f64,
}

/// A ranked backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredBackend {
    pub id: BackendId,
    pub score: f64,
    pub avg_latency_ms: f64,
}

/// Backends the subscription may use for a prompt of `estimated_tokens`
///
/// Allowed by the plan, not down, and with a context window large enough.
/// Backends without a health entry are assumed healthy.
pub fn eligible_backends<'a>(
    registry: &'a BackendRegistry,
    context: &SubscriptionContext,
    health: &BTreeMap<BackendId, HealthSnapshot>,
    estimated_tokens: usize,
) -> Vec<&'a BackendProfile> {
    registry
        .profiles()
        .filter(|profile| {
            if !context.allows(&profile.id) {
                return false;
            }

            let state = health.get(&profile.id).map_or(HealthState::Up, |h| h.state);
            if state == HealthState::Down {
                tracing::debug!(backend = %profile.id, "skipping down backend");
                return false;
            }

            let fits = usize::try_from(profile.context_window).unwrap_or(usize::MAX) >= estimated_tokens;
            if !fits {
                tracing::debug!(
                    backend = %profile.id,
                    context_window = profile.context_window,
                    estimated_tokens,
                    "skipping backend with insufficient context window"
                );
            }
            fits
        })
        .collect()
}

/// Multi-factor ranking over eligible backends
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSelector {
    coefficients: ScoringConfig,
}

impl ModelSelector {
    pub const fn new(coefficients: ScoringConfig) -> Self {
        Self { coefficients }
    }

    pub fn score(&self, candidate: &Candidate<'_>, subscriber_priority: u8) -> f64 {
        let c = &self.coefficients;
        let health = &candidate.health;

        let penalty = if health.state == HealthState::Degraded {
            c.degraded_penalty
        } else {
            0.0
        };

        c.latency * (1.0 / (health.avg_latency_ms + 1.0))
            + c.capacity * (f64::from(candidate.profile.capacity) / 100.0)
            - c.cost * candidate.profile.cost_per_unit
            + c.priority * f64::from(subscriber_priority)
            + c.success * (health.success_rate / 100.0)
            + c.cost_weight * (candidate.weight / 10.0)
            + penalty
    }

    /// All candidates, best first
    pub fn rank(&self, candidates: &[Candidate<'_>], subscriber_priority: u8) -> Vec<ScoredBackend> {
        let mut scored: Vec<ScoredBackend> = candidates
            .iter()
            .map(|candidate| ScoredBackend {
                id: candidate.profile.id.clone(),
                score: self.score(candidate, subscriber_priority),
                avg_latency_ms: candidate.health.avg_latency_ms,
            })
            .collect();

        scored.sort_by(compare);
        scored
    }

    /// The best candidate, if any
    pub fn select(&self, candidates: &[Candidate<'_>], subscriber_priority: u8) -> Option<ScoredBackend> {
        self.rank(candidates, subscriber_priority).into_iter().next()
    }
}

fn compare(a: &ScoredBackend, b: &ScoredBackend) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.avg_latency_ms.total_cmp(&b.avg_latency_ms))
        .then_with(|| a.id.cmp(&b.id))
}
