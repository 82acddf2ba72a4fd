//! Shared state for Switchyard
//!
//! Rate-limit buckets, quota counters, caches, affinity records and health
//! statistics all live behind the [`Store`] trait. Every mutation a caller
//! needs to be race-free across broker instances is a single trait method,
//! so implementations can make it atomic (a shard lock in memory, a Lua
//! script in Redis).

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
pub mod memory;
pub mod valkey;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use switchyard_config::{StoreBackend, StoreConfig};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use valkey::RedisStore;

/// Result of taking a token from a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenGrant {
    /// A token was taken; `remaining` are left in this window
    Granted { remaining: u32 },
    /// The bucket is empty until the window resets
    Exhausted { reset_after: Duration },
}

/// Result of a conditional decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// The amount was subtracted
    Applied { remaining: u64 },
    /// The counter held less than the amount; nothing changed
    Insufficient { remaining: u64 },
}

/// Atomic key/value store shared by every request worker
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Read a value, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Write `value` without expiry and return the value it replaced
    async fn swap(&self, key: &str, value: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` without expiry only while the key holds `expected`
    ///
    /// `None` expects the key to be absent. Returns whether the write happened.
    async fn compare_and_set(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool, StoreError>;

    /// Add `delta` to an integer counter and return the new value
    ///
    /// A missing counter starts at zero and gets `ttl` when created. Existing
    /// counters keep their expiry.
    async fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64, StoreError>;

    /// Take one token from a bucket of `capacity` that refills once per `window`
    ///
    /// The window starts at the first take after a refill.
    async fn take_token(&self, key: &str, capacity: u32, window: Duration) -> Result<TokenGrant, StoreError>;

    /// Subtract `amount` from a counter only if it holds at least that much
    ///
    /// A missing counter is first initialised to `initial` with `ttl`.
    async fn try_decrement(
        &self,
        key: &str,
        amount: u64,
        initial: u64,
        ttl: Duration,
    ) -> Result<Decrement, StoreError>;
}

/// Build the store selected by configuration
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    match &config.backend {
        StoreBackend::Memory => {
            tracing::info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new(&config.key_prefix)))
        }
        StoreBackend::Redis(redis) => {
            tracing::info!(url = %redis.url, "connecting to redis store");
            let store = RedisStore::connect(redis.url.as_str(), redis.connect_timeout, &config.key_prefix).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Read and decode a JSON value
pub async fn get_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StoreError::Serialization(format!("decode '{key}': {e}")))
}

/// Encode and write a JSON value
pub async fn set_json<T: Serialize + Sync>(
    store: &dyn Store,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialization(format!("encode '{key}': {e}")))?;
    store.set(key, &raw, ttl).await
}

/// Read an integer counter, `None` when absent
pub async fn get_counter(store: &dyn Store, key: &str) -> Result<Option<i64>, StoreError> {
    store
        .get(key)
        .await?
        .map(|raw| {
            raw.parse::<i64>()
                .map_err(|_| StoreError::NotAnInteger { key: key.to_owned() })
        })
        .transpose()
}
