use std::time::Duration;

use indexmap::IndexMap;
use jiff::civil::Date;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Credential validation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// How long a resolved credential stays cached
    #[serde(default = "default_cache_ttl", deserialize_with = "crate::duration::deserialize")]
    pub cache_ttl: Duration,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            directory: DirectoryConfig::default(),
        }
    }
}

/// Source of credentials and subscriptions
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryConfig {
    /// Subscriptions and hashed credentials listed in this file
    Static(StaticDirectoryConfig),
    /// Remote account service resolving credential hashes
    Http(HttpDirectoryConfig),
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self::Static(StaticDirectoryConfig::default())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticDirectoryConfig {
    #[serde(default)]
    pub subscriptions: IndexMap<String, SubscriptionConfig>,
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    pub plan: String,
    #[serde(default)]
    pub status: SubscriptionStatus,
    /// Last day the subscription is valid
    #[serde(default)]
    pub expires_at: Option<Date>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Trial,
    Suspended,
    Cancelled,
    Expired,
}

/// A credential known to the static directory
///
/// Either the plaintext `key` or its lowercase hex SHA-256 `key_sha256`
/// must be given. Only the hash is kept after loading.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialConfig {
    #[serde(default)]
    pub key: Option<SecretString>,
    #[serde(default)]
    pub key_sha256: Option<String>,
    pub subscription: String,
    #[serde(default)]
    pub revoked: bool,
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("key_sha256", &self.key_sha256)
            .field("subscription", &self.subscription)
            .field("revoked", &self.revoked)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpDirectoryConfig {
    /// Base URL of the account service
    pub url: Url,
    /// Shared secret sent as a bearer token
    pub secret: SecretString,
    #[serde(default = "default_timeout", deserialize_with = "crate::duration::deserialize")]
    pub timeout: Duration,
}

const fn default_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

const fn default_timeout() -> Duration {
    Duration::from_secs(5)
}
