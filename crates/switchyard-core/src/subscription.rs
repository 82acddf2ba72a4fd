use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BackendId, RoutingMode};

/// Daily request budget of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaLimit {
    Unlimited,
    Limited(u64),
}

impl QuotaLimit {
    /// Interpret the configured value, where `-1` means unlimited
    pub fn from_config(value: i64) -> Self {
        u64::try_from(value).map_or(Self::Unlimited, Self::Limited)
    }

    pub const fn is_unlimited(self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

/// Smart-routing preferences carried by a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRouting {
    /// Mode applied when a request does not name one
    pub default_mode: RoutingMode,
    /// When false, only static plan weights steer selection
    pub smart_routing: bool,
    /// When false, every prompt is treated as simple
    pub complexity_detection: bool,
    /// When false, session affinity is neither consulted nor updated
    pub session_continuity: bool,
    /// Per-plan affinity similarity cutoff
    pub correlation_threshold: Option<f64>,
    /// Per-plan affinity lifetime
    pub session_ttl: Option<Duration>,
}

impl Default for PlanRouting {
    fn default() -> Self {
        Self {
            default_mode: RoutingMode::Auto,
            smart_routing: true,
            complexity_detection: true,
            session_continuity: true,
            correlation_threshold: None,
            session_ttl: None,
        }
    }
}

/// Everything the broker needs to know about the caller of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionContext {
    pub subscription_id: String,
    pub plan_id: String,
    /// Subscriber priority score, 0 to 100
    pub priority: u8,
    /// Backends the plan may use, with their static cost weights
    pub allowed_backends: BTreeMap<BackendId, f64>,
    /// Admitted requests per second; zero disables the limit
    pub qps: u32,
    pub daily_quota: QuotaLimit,
    pub routing: PlanRouting,
}

impl SubscriptionContext {
    pub fn allows(&self, backend: &BackendId) -> bool {
        self.allowed_backends.contains_key(backend)
    }

    /// Static weight of a backend on this plan
    pub fn static_weight(&self, backend: &BackendId) -> Option<f64> {
        self.allowed_backends.get(backend).copied()
    }
}
