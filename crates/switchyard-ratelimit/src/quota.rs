use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use jiff::tz::TimeZone;
use switchyard_core::QuotaLimit;
use switchyard_store::{Decrement, Store};

use crate::RateLimitError;

const SECONDS_PER_DAY: i64 = 86_400;

/// What is left of a subscription's daily quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaStatus {
    Unlimited,
    Remaining(u64),
}

/// Per-subscription, per-UTC-day request budget
///
/// The day's counter is created from the plan limit on first use and expires
/// at the next midnight, so a new day starts from a fresh counter.
#[derive(Clone)]
pub struct QuotaTracker {
    store: Arc<dyn Store>,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Charge `cost` units against today's quota
    ///
    /// Nothing is charged when the quota cannot cover the full cost.
    pub async fn consume(
        &self,
        subscription_id: &str,
        limit: QuotaLimit,
        cost: u32,
    ) -> Result<QuotaStatus, RateLimitError> {
        self.consume_at(subscription_id, limit, cost, Timestamp::now()).await
    }

    /// Charge against the quota of the day containing `now`
    pub async fn consume_at(
        &self,
        subscription_id: &str,
        limit: QuotaLimit,
        cost: u32,
        now: Timestamp,
    ) -> Result<QuotaStatus, RateLimitError> {
        let QuotaLimit::Limited(daily) = limit else {
            return Ok(QuotaStatus::Unlimited);
        };

        let key = day_key(subscription_id, now);
        let ttl = until_midnight(now);

        match self.store.try_decrement(&key, u64::from(cost), daily, ttl).await? {
            Decrement::Applied { remaining } => Ok(QuotaStatus::Remaining(remaining)),
            Decrement::Insufficient { remaining } => {
                tracing::debug!(subscription_id, remaining, cost, "daily quota exhausted");
                Err(RateLimitError::QuotaExceeded {
                    remaining,
                    requested: cost,
                    retry_after: ttl.as_secs().max(1),
                })
            }
        }
    }

    /// Today's remaining quota without charging anything
    pub async fn remaining(&self, subscription_id: &str, limit: QuotaLimit) -> Result<QuotaStatus, RateLimitError> {
        let QuotaLimit::Limited(daily) = limit else {
            return Ok(QuotaStatus::Unlimited);
        };

        let key = day_key(subscription_id, Timestamp::now());
        let left = switchyard_store::get_counter(self.store.as_ref(), &key).await?;

        Ok(QuotaStatus::Remaining(
            left.map_or(daily, |n| u64::try_from(n).unwrap_or(0)),
        ))
    }
}

fn day_key(subscription_id: &str, now: Timestamp) -> String {
    let date = now.to_zoned(TimeZone::UTC).date();
    format!("quota:{subscription_id}:{date}")
}

fn until_midnight(now: Timestamp) -> Duration {
    let elapsed = now.as_second().rem_euclid(SECONDS_PER_DAY);
    Duration::from_secs(u64::try_from(SECONDS_PER_DAY - elapsed).unwrap_or(1))
}
