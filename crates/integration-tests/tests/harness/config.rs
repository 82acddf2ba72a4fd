//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;
use switchyard_config::{
    AuthConfig, BackendConfig, BackendHealthConfig, Config, CredentialConfig, DirectoryConfig, HealthConfig,
    PlanBackends, PlanConfig, ProviderKind, ServerConfig, StaticDirectoryConfig, SubscriptionConfig,
    SubscriptionStatus,
};
use switchyard_core::{BackendTier, RoutingMode};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
    directory: StaticDirectoryConfig,
}

impl ConfigBuilder {
    /// Minimal defaults: memory store, log ledger, probe disabled
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig {
                        enabled: true,
                        ..HealthConfig::default()
                    },
                    ..ServerConfig::default()
                },
                health: BackendHealthConfig {
                    probe_enabled: false,
                    ..BackendHealthConfig::default()
                },
                ..Config::default()
            },
            directory: StaticDirectoryConfig::default(),
        }
    }

    /// Register a generic JSON backend
    pub fn with_backend(mut self, id: &str, endpoint: &str, capacity: u8) -> Self {
        self.config.backends.insert(
            id.to_owned(),
            BackendConfig {
                provider: ProviderKind::Http,
                endpoint: endpoint.parse().unwrap(),
                api_key: None,
                model: None,
                tier: BackendTier::Flagship,
                capacity,
                cost_per_unit: 0.0,
                context_window: 8192,
                timeout: Duration::from_millis(500),
                max_tokens: 1024,
            },
        );
        self
    }

    /// Adjust a registered backend
    pub fn tune_backend(mut self, id: &str, f: impl FnOnce(&mut BackendConfig)) -> Self {
        f(self.config.backends.get_mut(id).unwrap());
        self
    }

    /// Add a plan allowing `backends`, with smart routing off so capacity alone orders them
    pub fn with_plan(mut self, id: &str, qps: u32, daily_quota: i64, backends: &[&str]) -> Self {
        self.config.plans.insert(
            id.to_owned(),
            PlanConfig {
                priority: 10,
                qps,
                daily_quota,
                backends: PlanBackends::List(backends.iter().map(|b| (*b).to_owned()).collect()),
                default_mode: RoutingMode::Auto,
                smart_routing: false,
                complexity_detection: true,
                session_continuity: true,
                correlation_threshold: None,
                session_ttl: None,
            },
        );
        self
    }

    /// Adjust a registered plan
    pub fn tune_plan(mut self, id: &str, f: impl FnOnce(&mut PlanConfig)) -> Self {
        f(self.config.plans.get_mut(id).unwrap());
        self
    }

    /// Add a subscription on `plan` reachable with the credential `key`
    pub fn with_subscription(self, id: &str, plan: &str, key: &str) -> Self {
        self.with_subscription_status(id, plan, key, SubscriptionStatus::Active)
    }

    pub fn with_subscription_status(mut self, id: &str, plan: &str, key: &str, status: SubscriptionStatus) -> Self {
        self.directory.subscriptions.insert(
            id.to_owned(),
            SubscriptionConfig {
                plan: plan.to_owned(),
                status,
                expires_at: None,
            },
        );
        self.directory.credentials.push(CredentialConfig {
            key: Some(SecretString::from(key.to_owned())),
            key_sha256: None,
            subscription: id.to_owned(),
            revoked: false,
        });
        self
    }

    /// Run the active health probe at `interval`
    pub fn with_probe(mut self, interval: Duration) -> Self {
        self.config.health.probe_enabled = true;
        self.config.health.probe_interval = interval;
        self.config.health.probe_timeout = Duration::from_millis(500);
        self
    }

    pub fn build(mut self) -> Config {
        self.config.auth = AuthConfig {
            directory: DirectoryConfig::Static(self.directory),
            ..AuthConfig::default()
        };
        self.config.validate().unwrap();
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
