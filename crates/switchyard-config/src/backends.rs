use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use switchyard_core::BackendTier;
use url::Url;

/// One inference backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Wire protocol spoken by the backend
    #[serde(rename = "type")]
    pub provider: ProviderKind,
    pub endpoint: Url,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Upstream model name, when the protocol needs one
    #[serde(default)]
    pub model: Option<String>,
    pub tier: BackendTier,
    /// Throughput/quality headroom rating, 0 to 100
    #[serde(default = "default_capacity")]
    pub capacity: u8,
    #[serde(default)]
    pub cost_per_unit: f64,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default = "default_timeout", deserialize_with = "crate::duration::deserialize")]
    pub timeout: Duration,
    /// Output token cap passed to chat-style providers
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions
    Openai,
    /// Anthropic messages API
    Anthropic,
    /// Plain JSON `{"prompt": ...}` endpoint
    Http,
}

const fn default_capacity() -> u8 {
    50
}

const fn default_context_window() -> u32 {
    8192
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_max_tokens() -> u32 {
    1024
}
