use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::time::Instant;

use crate::{Decrement, Store, StoreError, TokenGrant};

/// Expired entries are swept after this many writes
const SWEEP_EVERY: u64 = 4096;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.expires_at
            .map_or(Duration::ZERO, |at| at.saturating_duration_since(now))
    }
}

/// Single-process store
///
/// Each operation holds the map shard lock for its key, which makes the
/// read-modify-write methods atomic with respect to one another. Time comes
/// from `tokio::time`, so paused-clock tests can step through windows.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    prefix: String,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new(prefix: &str) -> Self {
        Self {
            entries: DashMap::new(),
            prefix: prefix.to_owned(),
            writes: AtomicU64::new(0),
        }
    }

    fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{}:{key}", self.prefix)
        }
    }

    fn note_write(&self) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let now = Instant::now();
            self.entries.retain(|_, entry| entry.is_live(now));
        }
    }

    /// Live entry for `key`, dropping it first when expired
    fn live_entry(&self, key: &str) -> MapEntry<'_, String, Entry> {
        let now = Instant::now();
        match self.entries.entry(self.key(key)) {
            MapEntry::Occupied(occupied) if !occupied.get().is_live(now) => {
                let (k, _) = occupied.remove_entry();
                self.entries.entry(k)
            }
            other => other,
        }
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64, StoreError> {
    value
        .parse::<i64>()
        .map_err(|_| StoreError::NotAnInteger { key: key.to_owned() })
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let full = self.key(key);

        let value = self
            .entries
            .get(&full)
            .and_then(|entry| entry.is_live(now).then(|| entry.value.clone()));

        if value.is_none() {
            self.entries.remove_if(&full, |_, entry| !entry.is_live(now));
        }

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.entries.insert(self.key(key), Entry::new(value.to_owned(), ttl));
        self.note_write();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(&self.key(key));
        Ok(())
    }

    async fn swap(&self, key: &str, value: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let previous = self
            .entries
            .insert(self.key(key), Entry::new(value.to_owned(), None))
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value);

        self.note_write();
        Ok(previous)
    }

    async fn compare_and_set(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool, StoreError> {
        let written = match (self.live_entry(key), expected) {
            (MapEntry::Occupied(mut occupied), Some(expected)) if occupied.get().value == expected => {
                *occupied.get_mut() = Entry::new(value.to_owned(), None);
                true
            }
            (MapEntry::Vacant(vacant), None) => {
                vacant.insert(Entry::new(value.to_owned(), None));
                true
            }
            _ => false,
        };

        if written {
            self.note_write();
        }
        Ok(written)
    }

    async fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64, StoreError> {
        let value = match self.live_entry(key) {
            MapEntry::Occupied(mut occupied) => {
                let next = parse_int(key, &occupied.get().value)?.saturating_add(delta);
                occupied.get_mut().value = next.to_string();
                next
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(delta.to_string(), ttl));
                delta
            }
        };

        self.note_write();
        Ok(value)
    }

    async fn take_token(&self, key: &str, capacity: u32, window: Duration) -> Result<TokenGrant, StoreError> {
        let now = Instant::now();

        let grant = match self.live_entry(key) {
            MapEntry::Occupied(mut occupied) => {
                let tokens = parse_int(key, &occupied.get().value)?;
                if tokens > 0 {
                    occupied.get_mut().value = (tokens - 1).to_string();
                    TokenGrant::Granted {
                        remaining: u32::try_from(tokens - 1).unwrap_or(0),
                    }
                } else {
                    TokenGrant::Exhausted {
                        reset_after: occupied.get().remaining(now),
                    }
                }
            }
            MapEntry::Vacant(vacant) => {
                let remaining = capacity.saturating_sub(1);
                vacant.insert(Entry::new(remaining.to_string(), Some(window)));
                TokenGrant::Granted { remaining }
            }
        };

        self.note_write();
        Ok(grant)
    }

    async fn try_decrement(
        &self,
        key: &str,
        amount: u64,
        initial: u64,
        ttl: Duration,
    ) -> Result<Decrement, StoreError> {
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);

        let mut slot = self
            .live_entry(key)
            .or_insert_with(|| Entry::new(initial.to_string(), Some(ttl)));

        let current = parse_int(key, &slot.value)?.max(0);
        let outcome = if current >= amount {
            slot.value = (current - amount).to_string();
            Decrement::Applied {
                remaining: u64::try_from(current - amount).unwrap_or(0),
            }
        } else {
            Decrement::Insufficient {
                remaining: u64::try_from(current).unwrap_or(0),
            }
        };
        drop(slot);

        self.note_write();
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_delete() {
        let store = MemoryStore::new("t");
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn values_expire() {
        let store = MemoryStore::new("t");
        store.set("k", "v", Some(Duration::from_secs(60))).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn incr_keeps_expiry_of_first_write() {
        let store = MemoryStore::new("t");
        let ttl = Some(Duration::from_secs(10));

        assert_eq!(store.incr("c", 1, ttl).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.incr("c", 1, ttl).await.unwrap(), 2);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.incr("c", 1, ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn incr_rejects_non_integer() {
        let store = MemoryStore::new("t");
        store.set("c", "nope", None).await.unwrap();
        assert!(matches!(
            store.incr("c", 1, None).await,
            Err(StoreError::NotAnInteger { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_empties_then_refills_after_window() {
        let store = MemoryStore::new("t");
        let window = Duration::from_secs(1);

        assert_eq!(
            store.take_token("b", 2, window).await.unwrap(),
            TokenGrant::Granted { remaining: 1 }
        );
        assert_eq!(
            store.take_token("b", 2, window).await.unwrap(),
            TokenGrant::Granted { remaining: 0 }
        );
        assert!(matches!(
            store.take_token("b", 2, window).await.unwrap(),
            TokenGrant::Exhausted { .. }
        ));

        tokio::time::advance(window).await;
        assert_eq!(
            store.take_token("b", 2, window).await.unwrap(),
            TokenGrant::Granted { remaining: 1 }
        );
    }

    #[tokio::test]
    async fn decrement_never_goes_negative() {
        let store = MemoryStore::new("t");
        let ttl = Duration::from_secs(60);

        assert_eq!(
            store.try_decrement("q", 2, 3, ttl).await.unwrap(),
            Decrement::Applied { remaining: 1 }
        );
        assert_eq!(
            store.try_decrement("q", 2, 3, ttl).await.unwrap(),
            Decrement::Insufficient { remaining: 1 }
        );
        assert_eq!(
            store.try_decrement("q", 1, 3, ttl).await.unwrap(),
            Decrement::Applied { remaining: 0 }
        );
        assert_eq!(
            store.try_decrement("q", 1, 3, ttl).await.unwrap(),
            Decrement::Insufficient { remaining: 0 }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_takes_never_overdraw() {
        let store = std::sync::Arc::new(MemoryStore::new("t"));
        let mut handles = Vec::new();

        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.take_token("shared", 10, Duration::from_secs(60)).await.unwrap()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), TokenGrant::Granted { .. }) {
                granted += 1;
            }
        }

        assert_eq!(granted, 10);
    }

    #[tokio::test]
    async fn swap_returns_previous_value() {
        let store = MemoryStore::new("t");
        assert_eq!(store.swap("k", "up").await.unwrap(), None);
        assert_eq!(store.swap("k", "down").await.unwrap().as_deref(), Some("up"));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("down"));
    }

    #[tokio::test]
    async fn compare_and_set_only_replaces_expected_value() {
        let store = MemoryStore::new("t");

        assert!(!store.compare_and_set("k", Some("up"), "degraded").await.unwrap());
        assert!(store.compare_and_set("k", None, "degraded").await.unwrap());
        assert!(!store.compare_and_set("k", None, "up").await.unwrap());
        assert!(!store.compare_and_set("k", Some("up"), "down").await.unwrap());
        assert!(store.compare_and_set("k", Some("degraded"), "up").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("up"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_compare_and_set_has_one_winner() {
        let store = std::sync::Arc::new(MemoryStore::new("t"));
        store.set("k", "degraded", None).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .compare_and_set("k", Some("degraded"), &format!("winner-{i}"))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn prefix_isolates_stores() {
        let a = MemoryStore::new("a");
        a.set("k", "1", None).await.unwrap();
        assert_eq!(a.entries.len(), 1);
        assert!(a.entries.contains_key("a:k"));
    }
}
