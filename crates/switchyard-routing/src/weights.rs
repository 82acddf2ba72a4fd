//! Mode-driven steering weights
//!
//! Each routing mode maps backend tiers to a weight between 0 and 100. The
//! computed map for a plan is cached for a few minutes and only ever replaces
//! the plan's static weights for the duration of a request.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use switchyard_core::{BackendId, BackendTier, Category, RoutingMode, SubscriptionContext};
use switchyard_store::Store;

use crate::{BackendRegistry, RoutingError};

/// Weight of a tier under a mode, for a task category
pub const fn mode_weight(mode: RoutingMode, category: Category, tier: BackendTier) -> f64 {
    use BackendTier::{Budget, Fast, Flagship, Multimodal, Premium};

    match (mode, category) {
        (RoutingMode::Auto, Category::Simple) => match tier {
            Budget => 80.0,
            Fast => 10.0,
            Multimodal => 5.0,
            Premium => 3.0,
            Flagship => 2.0,
        },
        (RoutingMode::Auto, Category::Reasoning) => match tier {
            Budget | Fast => 40.0,
            Multimodal => 10.0,
            Premium => 7.0,
            Flagship => 3.0,
        },
        (RoutingMode::Auto, Category::Complex) => match tier {
            Premium => 50.0,
            Flagship => 25.0,
            Multimodal => 15.0,
            Fast => 8.0,
            Budget => 2.0,
        },
        (RoutingMode::Auto, Category::Multimodal) => match tier {
            Multimodal => 70.0,
            Premium => 15.0,
            Flagship => 10.0,
            Fast => 3.0,
            Budget => 2.0,
        },
        (RoutingMode::Performance, _) => match tier {
            Premium => 60.0,
            Flagship => 30.0,
            Multimodal => 8.0,
            Fast => 2.0,
            Budget => 0.0,
        },
        (RoutingMode::Efficient, Category::Reasoning) => match tier {
            Budget => 60.0,
            Fast => 35.0,
            Multimodal => 3.0,
            Premium => 2.0,
            Flagship => 0.0,
        },
        (RoutingMode::Efficient, _) => match tier {
            Budget => 90.0,
            Fast => 8.0,
            Multimodal => 2.0,
            Premium | Flagship => 0.0,
        },
        (RoutingMode::Lite, _) => match tier {
            Fast => 70.0,
            Budget => 30.0,
            Multimodal | Premium | Flagship => 0.0,
        },
    }
}

/// Computes and caches per-plan weight overrides
#[derive(Clone)]
pub struct WeightOverrideEngine {
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl WeightOverrideEngine {
    pub fn new(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(plan_id: &str, mode: RoutingMode, category: Category) -> String {
        format!("weights:{plan_id}:{mode}:{category}")
    }

    /// Override weights for every registered backend the plan allows
    ///
    /// The map never depends on which backends a single request found
    /// eligible, so one cached entry serves every request of the plan. Served
    /// from cache when a fresh entry exists, otherwise computed and cached.
    /// If the store fails the weights are still computed.
    pub async fn weights_for(
        &self,
        ctx: &SubscriptionContext,
        mode: RoutingMode,
        category: Category,
        registry: &BackendRegistry,
    ) -> BTreeMap<BackendId, f64> {
        let plan_id = ctx.plan_id.as_str();
        let key = Self::key(plan_id, mode, category);

        match self.cached(&key).await {
            Ok(Some(weights)) => return weights,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, plan_id, "weight cache read failed"),
        }

        let weights: BTreeMap<BackendId, f64> = ctx
            .allowed_backends
            .keys()
            .filter_map(|id| registry.get(id))
            .map(|b| (b.id.clone(), mode_weight(mode, category, b.tier)))
            .collect();

        if let Err(e) = switchyard_store::set_json(self.store.as_ref(), &key, &weights, Some(self.ttl)).await {
            tracing::warn!(error = %e, plan_id, "weight cache write failed");
        }

        tracing::debug!(plan_id, %mode, %category, "weight override computed");

        weights
    }

    async fn cached(&self, key: &str) -> Result<Option<BTreeMap<BackendId, f64>>, RoutingError> {
        Ok(switchyard_store::get_json(self.store.as_ref(), key).await?)
    }
}

#[cfg(test)]
mod tests {
    use switchyard_core::{BackendProfile, PlanRouting, QuotaLimit};
    use switchyard_store::MemoryStore;

    use super::*;

    fn profile(id: &str, tier: BackendTier) -> BackendProfile {
        BackendProfile {
            id: id.into(),
            endpoint: "http://localhost".into(),
            tier,
            capacity: 50,
            cost_per_unit: 0.1,
            context_window: 8192,
            timeout: Duration::from_secs(5),
        }
    }

    fn registry() -> BackendRegistry {
        BackendRegistry::from_profiles([
            profile("cheap", BackendTier::Budget),
            profile("best", BackendTier::Premium),
            profile("other", BackendTier::Fast),
        ])
    }

    fn pro(backends: &[&str]) -> SubscriptionContext {
        SubscriptionContext {
            subscription_id: "acme".to_owned(),
            plan_id: "pro".to_owned(),
            priority: 10,
            allowed_backends: backends.iter().map(|id| (BackendId::from(*id), 10.0)).collect(),
            qps: 0,
            daily_quota: QuotaLimit::Unlimited,
            routing: PlanRouting::default(),
        }
    }

    fn engine() -> (WeightOverrideEngine, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new("t"));
        (WeightOverrideEngine::new(store.clone(), Duration::from_secs(300)), store)
    }

    #[test]
    fn auto_mode_follows_category() {
        assert!(
            mode_weight(RoutingMode::Auto, Category::Simple, BackendTier::Budget)
                > mode_weight(RoutingMode::Auto, Category::Simple, BackendTier::Premium)
        );
        assert!(
            mode_weight(RoutingMode::Auto, Category::Complex, BackendTier::Premium)
                > mode_weight(RoutingMode::Auto, Category::Complex, BackendTier::Budget)
        );
        assert!(
            (mode_weight(RoutingMode::Auto, Category::Multimodal, BackendTier::Multimodal) - 70.0).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn fixed_modes_ignore_category_except_efficient_reasoning() {
        for category in [Category::Simple, Category::Complex, Category::Multimodal] {
            assert!(
                (mode_weight(RoutingMode::Performance, category, BackendTier::Premium) - 60.0).abs() < f64::EPSILON
            );
            assert!((mode_weight(RoutingMode::Lite, category, BackendTier::Premium)).abs() < f64::EPSILON);
            assert!((mode_weight(RoutingMode::Efficient, category, BackendTier::Budget) - 90.0).abs() < f64::EPSILON);
        }
        assert!(
            (mode_weight(RoutingMode::Efficient, Category::Reasoning, BackendTier::Budget) - 60.0).abs()
                < f64::EPSILON
        );
    }

    #[tokio::test]
    async fn weights_cover_every_backend_the_plan_allows() {
        let (engine, _) = engine();

        let weights = engine
            .weights_for(&pro(&["cheap", "best", "retired"]), RoutingMode::Performance, Category::Simple, &registry())
            .await;

        assert_eq!(weights.len(), 2);
        assert!((weights[&BackendId::from("best")] - 60.0).abs() < f64::EPSILON);
        assert!(weights[&BackendId::from("cheap")].abs() < f64::EPSILON);
        assert!(!weights.contains_key(&BackendId::from("other")));
    }

    #[tokio::test]
    async fn cached_entry_holds_the_full_plan_map() {
        let (engine, store) = engine();
        let ctx = pro(&["cheap", "best"]);

        engine
            .weights_for(&ctx, RoutingMode::Auto, Category::Simple, &registry())
            .await;

        let cached: BTreeMap<BackendId, f64> = switchyard_store::get_json(store.as_ref(), "weights:pro:auto:simple")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.len(), 2);
        assert!((cached[&BackendId::from("cheap")] - 80.0).abs() < f64::EPSILON);
        assert!((cached[&BackendId::from("best")] - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_overrides_expire() {
        let (engine, store) = engine();

        engine
            .weights_for(&pro(&["cheap"]), RoutingMode::Lite, Category::Simple, &registry())
            .await;
        assert!(store.get("weights:pro:lite:simple").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(store.get("weights:pro:lite:simple").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cache_is_served_while_fresh() {
        let (engine, store) = engine();
        store
            .set("weights:pro:auto:simple", r#"{"cheap":42.0}"#, None)
            .await
            .unwrap();

        let weights = engine
            .weights_for(&pro(&["cheap"]), RoutingMode::Auto, Category::Simple, &registry())
            .await;
        assert!((weights[&BackendId::from("cheap")] - 42.0).abs() < f64::EPSILON);
    }
}
