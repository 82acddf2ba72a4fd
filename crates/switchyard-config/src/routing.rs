use std::time::Duration;

use serde::Deserialize;

/// Selection tuning
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub affinity: AffinityConfig,
    #[serde(default)]
    pub weights: WeightsConfig,
}

/// Coefficients of the backend score
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScoringConfig {
    pub latency: f64,
    pub capacity: f64,
    pub cost: f64,
    pub priority: f64,
    pub success: f64,
    pub cost_weight: f64,
    /// Added to the score of degraded backends
    pub degraded_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            latency: 1.0,
            capacity: 0.5,
            cost: 1.5,
            priority: 2.0,
            success: 0.3,
            cost_weight: 3.0,
            degraded_penalty: -10.0,
        }
    }
}

/// Size thresholds used when no keyword rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClassifierConfig {
    pub complex_tokens: usize,
    pub reasoning_tokens: usize,
    pub simple_chars: usize,
    pub reasoning_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            complex_tokens: 10_000,
            reasoning_tokens: 5_000,
            simple_chars: 100,
            reasoning_chars: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AffinityConfig {
    /// Minimum Jaccard similarity for reusing the previous backend
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_affinity_ttl", deserialize_with = "crate::duration::deserialize")]
    pub ttl: Duration,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            ttl: default_affinity_ttl(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightsConfig {
    /// Lifetime of a computed weight override
    #[serde(default = "default_weights_ttl", deserialize_with = "crate::duration::deserialize")]
    pub ttl: Duration,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            ttl: default_weights_ttl(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_threshold() -> f64 {
    0.7
}

const fn default_affinity_ttl() -> Duration {
    Duration::from_secs(3600)
}

const fn default_weights_ttl() -> Duration {
    Duration::from_secs(300)
}
