use std::time::Duration;

use serde::Deserialize;

/// Backend health tracking and probing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendHealthConfig {
    /// Consecutive failures before a backend is degraded
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,
    /// Consecutive failures before a backend is taken out of rotation
    #[serde(default = "default_down_after")]
    pub down_after: u32,
    /// Failures further apart than this do not count as consecutive
    #[serde(default = "default_failure_window", deserialize_with = "crate::duration::deserialize")]
    pub failure_window: Duration,
    #[serde(default = "default_true")]
    pub probe_enabled: bool,
    #[serde(default = "default_probe_interval", deserialize_with = "crate::duration::deserialize")]
    pub probe_interval: Duration,
    #[serde(default = "default_probe_timeout", deserialize_with = "crate::duration::deserialize")]
    pub probe_timeout: Duration,
}

impl Default for BackendHealthConfig {
    fn default() -> Self {
        Self {
            degraded_after: default_degraded_after(),
            down_after: default_down_after(),
            failure_window: default_failure_window(),
            probe_enabled: true,
            probe_interval: default_probe_interval(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

const fn default_degraded_after() -> u32 {
    3
}

const fn default_down_after() -> u32 {
    5
}

const fn default_failure_window() -> Duration {
    Duration::from_secs(60)
}

const fn default_probe_interval() -> Duration {
    Duration::from_secs(300)
}

const fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}
