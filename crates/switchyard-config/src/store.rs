use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Shared state store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Prefix applied to every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Where counters and caches live
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process maps (single instance only)
    #[default]
    Memory,
    /// Redis or Valkey, shared by every broker instance
    Redis(RedisConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    pub url: Url,
    #[serde(default = "default_connect_timeout", deserialize_with = "crate::duration::deserialize")]
    pub connect_timeout: Duration,
}

fn default_key_prefix() -> String {
    "switchyard".to_owned()
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
