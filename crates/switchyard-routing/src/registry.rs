//! Configured backends

use indexmap::IndexMap;
use switchyard_config::BackendConfig;
use switchyard_core::{BackendId, BackendProfile};

/// Static profiles of every configured backend, in configuration order
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    profiles: IndexMap<BackendId, BackendProfile>,
}

impl BackendRegistry {
    pub fn from_config(configs: &IndexMap<String, BackendConfig>) -> Self {
        let profiles = configs
            .iter()
            .map(|(id, config)| {
                let id = BackendId::from(id.as_str());
                let profile = BackendProfile {
                    id: id.clone(),
                    endpoint: config.endpoint.to_string(),
                    tier: config.tier,
                    capacity: config.capacity,
                    cost_per_unit: config.cost_per_unit,
                    context_window: config.context_window,
                    timeout: config.timeout,
                };
                (id, profile)
            })
            .collect();

        Self { profiles }
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = BackendProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn get(&self, id: &BackendId) -> Option<&BackendProfile> {
        self.profiles.get(id)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &BackendProfile> {
        self.profiles.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &BackendId> {
        self.profiles.keys()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
