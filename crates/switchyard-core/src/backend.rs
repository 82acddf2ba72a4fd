use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier of a configured backend (e.g. `claude-sonnet`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for BackendId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::borrow::Borrow<str> for BackendId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Broad price/quality class of a backend
///
/// Routing modes express their steering tables over tiers so they apply to
/// whatever concrete backends a deployment registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendTier {
    /// Cheapest general-purpose backends
    Budget,
    /// Low-latency backends with a free or near-free tier
    Fast,
    /// Backends strongest at images, charts and diagrams
    Multimodal,
    /// High-quality general backends
    Flagship,
    /// Most capable and most expensive backends
    Premium,
}

/// Health classification of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Up,
    Degraded,
    Down,
}

impl HealthState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "degraded" => Ok(Self::Degraded),
            "down" => Ok(Self::Down),
            other => Err(format!("unknown health state: {other}")),
        }
    }
}

/// Static description of a backend, sourced from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendProfile {
    pub id: BackendId,
    /// Base URL used for invocation and health probes
    pub endpoint: String,
    pub tier: BackendTier,
    /// Throughput/quality headroom rating, 0 to 100
    pub capacity: u8,
    /// Price of one cost unit on this backend
    pub cost_per_unit: f64,
    /// Largest prompt, in tokens, the backend accepts
    pub context_window: u32,
    /// Per-call timeout
    pub timeout: Duration,
}

/// Observed health of a backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub state: HealthState,
    /// Running average latency in milliseconds
    pub avg_latency_ms: f64,
    /// Percentage of successful calls, 0 to 100
    pub success_rate: f64,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub failed_requests: u64,
}

impl Default for HealthSnapshot {
    /// Optimistic defaults for a backend with no history
    fn default() -> Self {
        Self {
            state: HealthState::Up,
            avg_latency_ms: 100.0,
            success_rate: 100.0,
            consecutive_failures: 0,
            total_requests: 0,
            failed_requests: 0,
        }
    }
}
