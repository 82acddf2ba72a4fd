use std::sync::Arc;
use std::time::Duration;

use switchyard_store::{Store, TokenGrant};

use crate::RateLimitError;

/// Refill interval of every bucket
const WINDOW: Duration = Duration::from_secs(1);

/// Per-subscription token bucket
///
/// Capacity equals the plan's QPS. The bucket lives in one expiring counter:
/// the first admitted request of a window creates it full minus one, and it
/// disappears (refills) when the window ends.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn Store>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn key(subscription_id: &str) -> String {
        format!("ratelimit:{subscription_id}")
    }

    /// Admit one request or fail immediately
    ///
    /// A `qps` of zero disables the limit. Returns the tokens left in the
    /// current window, `None` when unlimited.
    pub async fn check(&self, subscription_id: &str, qps: u32) -> Result<Option<u32>, RateLimitError> {
        if qps == 0 {
            return Ok(None);
        }

        match self.store.take_token(&Self::key(subscription_id), qps, WINDOW).await? {
            TokenGrant::Granted { remaining } => Ok(Some(remaining)),
            TokenGrant::Exhausted { reset_after } => {
                tracing::debug!(subscription_id, qps, "rate limit exhausted");
                Err(RateLimitError::Exceeded {
                    retry_after: retry_after_secs(reset_after),
                })
            }
        }
    }

    /// Tokens left in the current window without taking one
    pub async fn remaining(&self, subscription_id: &str, qps: u32) -> Result<Option<u32>, RateLimitError> {
        if qps == 0 {
            return Ok(None);
        }

        let left = switchyard_store::get_counter(self.store.as_ref(), &Self::key(subscription_id)).await?;
        Ok(Some(left.map_or(qps, |n| u32::try_from(n.max(0)).unwrap_or(qps))))
    }
}

/// Whole seconds to wait, never less than one
fn retry_after_secs(reset_after: Duration) -> u64 {
    u64::try_from(reset_after.as_millis().div_ceil(1000))
        .unwrap_or(u64::MAX)
        .max(1)
}

#[cfg(test)]
mod tests {
    use switchyard_store::MemoryStore;

    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new("test")))
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_request_beyond_qps_then_recovers() {
        let limiter = limiter();

        for _ in 0..3 {
            limiter.check("sub", 3).await.unwrap();
        }
        let err = limiter.check("sub", 3).await.unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded { retry_after: 1 }));

        tokio::time::advance(Duration::from_secs(1)).await;

        for _ in 0..3 {
            limiter.check("sub", 3).await.unwrap();
        }
        assert!(limiter.check("sub", 3).await.is_err());
    }

    #[tokio::test]
    async fn zero_qps_is_unlimited() {
        let limiter = limiter();
        for _ in 0..1000 {
            assert_eq!(limiter.check("sub", 0).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn subscriptions_have_separate_buckets() {
        let limiter = limiter();
        limiter.check("a", 1).await.unwrap();
        assert!(limiter.check("a", 1).await.is_err());
        limiter.check("b", 1).await.unwrap();
    }

    #[tokio::test]
    async fn remaining_reports_without_consuming() {
        let limiter = limiter();
        assert_eq!(limiter.remaining("sub", 5).await.unwrap(), Some(5));
        limiter.check("sub", 5).await.unwrap();
        assert_eq!(limiter.remaining("sub", 5).await.unwrap(), Some(4));
        assert_eq!(limiter.remaining("sub", 5).await.unwrap(), Some(4));
        assert_eq!(limiter.remaining("sub", 0).await.unwrap(), None);
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(300)), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(1)), 1);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
    }
}
