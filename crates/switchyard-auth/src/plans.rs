use std::collections::HashMap;

use indexmap::IndexMap;
use switchyard_config::PlanConfig;
use switchyard_core::SubscriptionContext;

use crate::{AuthError, CredentialRecord};

/// Entitlements of every configured plan
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    plans: HashMap<String, PlanConfig>,
}

impl PlanCatalog {
    pub fn from_config(plans: &IndexMap<String, PlanConfig>) -> Self {
        Self {
            plans: plans.iter().map(|(id, plan)| (id.clone(), plan.clone())).collect(),
        }
    }

    pub fn contains(&self, plan_id: &str) -> bool {
        self.plans.contains_key(plan_id)
    }

    pub fn get(&self, plan_id: &str) -> Option<&PlanConfig> {
        self.plans.get(plan_id)
    }

    /// Join a directory record with its plan
    pub fn context_for(&self, record: &CredentialRecord) -> Result<SubscriptionContext, AuthError> {
        let plan = self
            .plans
            .get(&record.plan_id)
            .ok_or_else(|| AuthError::Forbidden(format!("plan '{}' is not offered", record.plan_id)))?;

        Ok(SubscriptionContext {
            subscription_id: record.subscription_id.clone(),
            plan_id: record.plan_id.clone(),
            priority: plan.priority,
            allowed_backends: plan.static_weights(),
            qps: plan.qps,
            daily_quota: plan.quota_limit(),
            routing: plan.routing(),
        })
    }
}
