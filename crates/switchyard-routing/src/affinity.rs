//! Session affinity: keep a conversation on the backend that started it
//!
//! Advisory only. A missing, stale or unreadable record just means the
//! request is scored from scratch.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchyard_config::AffinityConfig;
use switchyard_core::BackendId;
use switchyard_store::Store;

use crate::RoutingError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct AffinityRecord {
    /// Normalised token set of the last prompt seen
    signature: String,
    /// Backend that served the session last, if any request succeeded
    #[serde(default)]
    backend: Option<BackendId>,
}

/// Token-set Jaccard similarity of two prompts, case-insensitive
#[allow(clippy::cast_precision_loss)]
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a = token_set(a);
    let b = token_set(b);

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let shared = a.intersection(&b).count();
    let union = a.union(&b).count();

    shared as f64 / union as f64
}

fn token_set(text: &str) -> BTreeSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn signature(prompt: &str) -> String {
    token_set(prompt).into_iter().collect::<Vec<_>>().join(" ")
}

/// Remembers, per session, the last prompt and the backend that served it
#[derive(Clone)]
pub struct SessionAffinityTracker {
    store: Arc<dyn Store>,
    config: AffinityConfig,
}

impl SessionAffinityTracker {
    pub fn new(store: Arc<dyn Store>, config: AffinityConfig) -> Self {
        Self { store, config }
    }

    fn key(session_id: &str) -> String {
        format!("affinity:{session_id}")
    }

    /// Previous backend of the session when `prompt` continues it
    ///
    /// A continuation needs similarity of at least `threshold` (the global
    /// default when `None`). Otherwise the prompt is remembered so the next
    /// call can compare against it.
    pub async fn resolve(
        &self,
        session_id: &str,
        prompt: &str,
        threshold: Option<f64>,
        ttl: Option<Duration>,
    ) -> Result<Option<BackendId>, RoutingError> {
        let threshold = threshold.unwrap_or(self.config.threshold);
        let key = Self::key(session_id);
        let current = signature(prompt);

        let previous = switchyard_store::get_json::<AffinityRecord>(self.store.as_ref(), &key).await?;

        if let Some(record) = previous {
            let similarity = jaccard_similarity(&record.signature, &current);

            if similarity >= threshold
                && let Some(backend) = record.backend
            {
                tracing::debug!(session_id, %backend, similarity, "session continues on previous backend");
                return Ok(Some(backend));
            }

            tracing::debug!(session_id, similarity, threshold, "session prompt diverged");
        }

        let record = AffinityRecord {
            signature: current,
            backend: None,
        };
        switchyard_store::set_json(self.store.as_ref(), &key, &record, Some(ttl.unwrap_or(self.config.ttl))).await?;

        Ok(None)
    }

    /// Remember the backend that served `prompt` for this session
    pub async fn record(
        &self,
        session_id: &str,
        prompt: &str,
        backend: &BackendId,
        ttl: Option<Duration>,
    ) -> Result<(), RoutingError> {
        let record = AffinityRecord {
            signature: signature(prompt),
            backend: Some(backend.clone()),
        };

        switchyard_store::set_json(
            self.store.as_ref(),
            &Self::key(session_id),
            &record,
            Some(ttl.unwrap_or(self.config.ttl)),
        )
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use switchyard_store::MemoryStore;

    use super::*;

    fn tracker() -> SessionAffinityTracker {
        SessionAffinityTracker::new(Arc::new(MemoryStore::new("test")), AffinityConfig::default())
    }

    #[test]
    fn similarity_bounds() {
        assert!((jaccard_similarity("fix the bug", "Fix The Bug") - 1.0).abs() < f64::EPSILON);
        assert!(jaccard_similarity("alpha beta", "gamma delta").abs() < f64::EPSILON);
        assert!(jaccard_similarity("", "anything").abs() < f64::EPSILON);
        assert!((jaccard_similarity("a b c d", "a b c e") - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn first_prompt_has_no_affinity() {
        let tracker = tracker();
        assert_eq!(tracker.resolve("s1", "hello world", None, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn identical_prompt_reuses_backend() {
        let tracker = tracker();
        let backend = BackendId::from("claude");

        tracker.resolve("s1", "explain the borrow checker", None, None).await.unwrap();
        tracker
            .record("s1", "explain the borrow checker", &backend, None)
            .await
            .unwrap();

        let hit = tracker
            .resolve("s1", "explain the borrow checker", None, None)
            .await
            .unwrap();
        assert_eq!(hit, Some(backend));
    }

    #[tokio::test]
    async fn dissimilar_prompt_rescores_and_replaces_signature() {
        let tracker = tracker();
        tracker
            .record("s1", "explain the borrow checker", &"claude".into(), None)
            .await
            .unwrap();

        assert_eq!(
            tracker.resolve("s1", "recipe for pancakes", None, None).await.unwrap(),
            None
        );
        // The stored prompt is now the pancake one, with no backend yet
        assert_eq!(
            tracker.resolve("s1", "recipe for pancakes", None, None).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn per_plan_threshold_overrides_default() {
        let tracker = tracker();
        tracker.record("s1", "a b c d", &"x".into(), None).await.unwrap();

        // 0.6 similarity: below the 0.7 default, above a 0.5 override
        assert_eq!(tracker.resolve("s1", "a b c e", Some(0.5), None).await.unwrap(), Some("x".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn records_expire() {
        let tracker = tracker();
        tracker.record("s1", "same prompt", &"x".into(), None).await.unwrap();

        tokio::time::advance(Duration::from_secs(3601)).await;
        assert_eq!(tracker.resolve("s1", "same prompt", None, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let tracker = tracker();
        tracker.record("s1", "same prompt", &"x".into(), None).await.unwrap();
        assert_eq!(tracker.resolve("s2", "same prompt", None, None).await.unwrap(), None);
    }
}
