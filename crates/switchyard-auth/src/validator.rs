use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use jiff::civil::Date;
use jiff::tz::TimeZone;
use switchyard_config::SubscriptionStatus;
use switchyard_core::SubscriptionContext;
use switchyard_store::Store;

use crate::{AuthError, CredentialRecord, PlanCatalog, SubscriptionDirectory, credential_hash};

/// Resolves credentials to subscription context, caching successes
///
/// Cache entries are only dropped by expiry, so a revoked credential keeps
/// working for at most one cache TTL.
#[derive(Clone)]
pub struct AuthValidator {
    directory: Arc<dyn SubscriptionDirectory>,
    catalog: PlanCatalog,
    store: Arc<dyn Store>,
    cache_ttl: Duration,
}

impl AuthValidator {
    pub fn new(
        directory: Arc<dyn SubscriptionDirectory>,
        catalog: PlanCatalog,
        store: Arc<dyn Store>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            directory,
            catalog,
            store,
            cache_ttl,
        }
    }

    /// Resolve a raw credential
    pub async fn validate(&self, credential: &str) -> Result<SubscriptionContext, AuthError> {
        let hash = credential_hash(credential);
        let cache_key = format!("auth:{hash}");

        match switchyard_store::get_json::<SubscriptionContext>(self.store.as_ref(), &cache_key).await {
            Ok(Some(context)) => return Ok(context),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "auth cache read failed, resolving from directory"),
        }

        let record = self.directory.lookup(&hash).await?.ok_or(AuthError::Unauthorized)?;

        if record.revoked {
            tracing::debug!(subscription_id = %record.subscription_id, "revoked credential presented");
            return Err(AuthError::Unauthorized);
        }

        check_subscription(&record, today())?;

        let context = self.catalog.context_for(&record)?;

        if let Err(e) =
            switchyard_store::set_json(self.store.as_ref(), &cache_key, &context, Some(self.cache_ttl)).await
        {
            tracing::warn!(error = %e, "auth cache write failed");
        }

        tracing::debug!(
            subscription_id = %context.subscription_id,
            plan_id = %context.plan_id,
            "credential resolved"
        );

        Ok(context)
    }
}

fn today() -> Date {
    Timestamp::now().to_zoned(TimeZone::UTC).date()
}

fn check_subscription(record: &CredentialRecord, today: Date) -> Result<(), AuthError> {
    match record.status {
        SubscriptionStatus::Active | SubscriptionStatus::Trial => {}
        SubscriptionStatus::Suspended => return Err(AuthError::Forbidden("subscription suspended".into())),
        SubscriptionStatus::Cancelled => return Err(AuthError::Forbidden("subscription cancelled".into())),
        SubscriptionStatus::Expired => return Err(AuthError::Forbidden("subscription expired".into())),
    }

    if record.expires_at.is_some_and(|last_day| today > last_day) {
        return Err(AuthError::Forbidden("subscription expired".into()));
    }

    Ok(())
}
