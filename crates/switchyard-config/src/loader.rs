use std::path::Path;

use anyhow::Context;
use secrecy::ExposeSecret;

use crate::{Config, DirectoryConfig};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, expansion or parsing
    /// fails, or the configuration is inconsistent
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion or parsing fails, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).context("failed to parse config")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error naming the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_backends()?;
        self.validate_plans()?;
        self.validate_health()?;
        self.validate_routing()?;
        self.validate_directory()?;
        Ok(())
    }

    fn validate_backends(&self) -> anyhow::Result<()> {
        if self.backends.is_empty() {
            anyhow::bail!("at least one backend must be configured");
        }

        for (id, backend) in &self.backends {
            if backend.capacity > 100 {
                anyhow::bail!("backend '{id}': capacity must be between 0 and 100");
            }
            if !backend.cost_per_unit.is_finite() || backend.cost_per_unit < 0.0 {
                anyhow::bail!("backend '{id}': cost_per_unit must be a non-negative number");
            }
            if backend.context_window == 0 {
                anyhow::bail!("backend '{id}': context_window must be greater than 0");
            }
            if backend.timeout.is_zero() {
                anyhow::bail!("backend '{id}': timeout must be greater than 0");
            }
        }

        Ok(())
    }

    fn validate_plans(&self) -> anyhow::Result<()> {
        for (id, plan) in &self.plans {
            if plan.priority > 100 {
                anyhow::bail!("plan '{id}': priority must be between 0 and 100");
            }
            if plan.daily_quota < -1 {
                anyhow::bail!("plan '{id}': daily_quota must be -1 (unlimited) or non-negative");
            }
            if plan.backends.ids().is_empty() {
                anyhow::bail!("plan '{id}': at least one backend must be allowed");
            }
            for backend in plan.backends.ids() {
                if !self.backends.contains_key(backend) {
                    anyhow::bail!("plan '{id}' references unknown backend '{backend}'");
                }
            }
            if let Some(threshold) = plan.correlation_threshold
                && !(0.0..=1.0).contains(&threshold)
            {
                anyhow::bail!("plan '{id}': correlation_threshold must be between 0 and 1");
            }
        }

        Ok(())
    }

    fn validate_health(&self) -> anyhow::Result<()> {
        if self.health.degraded_after == 0 {
            anyhow::bail!("health.degraded_after must be greater than 0");
        }
        if self.health.down_after <= self.health.degraded_after {
            anyhow::bail!("health.down_after must be greater than health.degraded_after");
        }
        Ok(())
    }

    fn validate_routing(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.routing.affinity.threshold) {
            anyhow::bail!("routing.affinity.threshold must be between 0 and 1");
        }
        let classifier = &self.routing.classifier;
        if classifier.reasoning_tokens > classifier.complex_tokens {
            anyhow::bail!("routing.classifier.reasoning_tokens must not exceed complex_tokens");
        }
        if classifier.simple_chars > classifier.reasoning_chars {
            anyhow::bail!("routing.classifier.simple_chars must not exceed reasoning_chars");
        }
        Ok(())
    }

    fn validate_directory(&self) -> anyhow::Result<()> {
        match &self.auth.directory {
            DirectoryConfig::Static(directory) => {
                for (id, subscription) in &directory.subscriptions {
                    if !self.plans.contains_key(&subscription.plan) {
                        anyhow::bail!("subscription '{id}' references unknown plan '{}'", subscription.plan);
                    }
                }
                for credential in &directory.credentials {
                    if credential.key.is_some() == credential.key_sha256.is_some() {
                        anyhow::bail!(
                            "credential for subscription '{}' must set exactly one of key or key_sha256",
                            credential.subscription
                        );
                    }
                    if !directory.subscriptions.contains_key(&credential.subscription) {
                        anyhow::bail!("credential references unknown subscription '{}'", credential.subscription);
                    }
                }
            }
            DirectoryConfig::Http(http) => {
                if http.secret.expose_secret().is_empty() {
                    anyhow::bail!("auth.directory.secret must not be empty");
                }
            }
        }

        Ok(())
    }
}
