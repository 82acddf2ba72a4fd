use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Usage recording pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsageConfig {
    /// Bound of the in-memory record queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Records allowed to wait for queue room once the queue is full
    #[serde(default = "default_queue_capacity")]
    pub overflow_capacity: usize,
    /// Records delivered to the ledger per write
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Flush a partial batch after this long
    #[serde(default = "default_flush_interval", deserialize_with = "crate::duration::deserialize")]
    pub flush_interval: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between delivery retries, doubled each attempt
    #[serde(default = "default_retry_backoff", deserialize_with = "crate::duration::deserialize")]
    pub retry_backoff: Duration,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            flush_interval: default_flush_interval(),
            max_retries: default_max_retries(),
            retry_backoff: default_retry_backoff(),
            ledger: LedgerConfig::default(),
        }
    }
}

/// Destination of usage records
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerConfig {
    /// Emit records as structured log events
    #[default]
    Log,
    /// POST batches to a billing service
    Http(HttpLedgerConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpLedgerConfig {
    pub url: Url,
    pub secret: SecretString,
    #[serde(default = "default_timeout", deserialize_with = "crate::duration::deserialize")]
    pub timeout: Duration,
}

const fn default_queue_capacity() -> usize {
    10_000
}

const fn default_batch_size() -> usize {
    100
}

const fn default_flush_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_retry_backoff() -> Duration {
    Duration::from_millis(200)
}

const fn default_timeout() -> Duration {
    Duration::from_secs(10)
}
