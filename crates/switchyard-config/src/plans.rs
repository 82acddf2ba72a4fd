use std::collections::BTreeMap;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use switchyard_core::{BackendId, PlanRouting, QuotaLimit, RoutingMode};

/// Weight given to a backend listed without one
pub const DEFAULT_STATIC_WEIGHT: f64 = 10.0;

/// Subscription plan: entitlements plus routing preferences
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    /// Subscriber priority, 0 to 100
    #[serde(default)]
    pub priority: u8,
    /// Requests per second; 0 disables the limit
    #[serde(default)]
    pub qps: u32,
    /// Requests per day; -1 is unlimited
    #[serde(default = "default_daily_quota")]
    pub daily_quota: i64,
    pub backends: PlanBackends,
    #[serde(default)]
    pub default_mode: RoutingMode,
    #[serde(default = "default_true")]
    pub smart_routing: bool,
    #[serde(default = "default_true")]
    pub complexity_detection: bool,
    #[serde(default = "default_true")]
    pub session_continuity: bool,
    #[serde(default)]
    pub correlation_threshold: Option<f64>,
    #[serde(default, deserialize_with = "crate::duration::deserialize_option")]
    pub session_ttl: Option<Duration>,
}

/// Backends a plan may use
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PlanBackends {
    /// `backends = ["a", "b"]`, every backend at the default weight
    List(Vec<String>),
    /// `backends = { a = 20, b = 5 }`
    Weighted(IndexMap<String, f64>),
}

impl PlanBackends {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::List(ids) => ids.iter().map(String::as_str).collect(),
            Self::Weighted(map) => map.keys().map(String::as_str).collect(),
        }
    }
}

impl PlanConfig {
    /// Static weight per allowed backend
    pub fn static_weights(&self) -> BTreeMap<BackendId, f64> {
        match &self.backends {
            PlanBackends::List(ids) => ids
                .iter()
                .map(|id| (BackendId::from(id.as_str()), DEFAULT_STATIC_WEIGHT))
                .collect(),
            PlanBackends::Weighted(map) => map
                .iter()
                .map(|(id, weight)| (BackendId::from(id.as_str()), *weight))
                .collect(),
        }
    }

    pub fn quota_limit(&self) -> QuotaLimit {
        QuotaLimit::from_config(self.daily_quota)
    }

    pub fn routing(&self) -> PlanRouting {
        PlanRouting {
            default_mode: self.default_mode,
            smart_routing: self.smart_routing,
            complexity_detection: self.complexity_detection,
            session_continuity: self.session_continuity,
            correlation_threshold: self.correlation_threshold,
            session_ttl: self.session_ttl,
        }
    }
}

const fn default_daily_quota() -> i64 {
    -1
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}
