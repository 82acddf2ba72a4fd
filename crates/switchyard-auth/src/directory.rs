use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jiff::civil::Date;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use switchyard_config::{DirectoryConfig, HttpDirectoryConfig, StaticDirectoryConfig, SubscriptionStatus};

use crate::{AuthError, credential_hash};

/// What the directory knows about one credential
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialRecord {
    pub subscription_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub revoked: bool,
    pub status: SubscriptionStatus,
    /// Last day the subscription is valid
    #[serde(default)]
    pub expires_at: Option<Date>,
}

/// Read-only view of issued credentials and their subscriptions
#[async_trait]
pub trait SubscriptionDirectory: Send + Sync {
    /// Look up a credential by its SHA-256 hash
    async fn lookup(&self, credential_hash: &str) -> Result<Option<CredentialRecord>, AuthError>;
}

/// Build the directory selected by configuration
pub fn build_directory(config: &DirectoryConfig) -> Result<Arc<dyn SubscriptionDirectory>, AuthError> {
    Ok(match config {
        DirectoryConfig::Static(config) => Arc::new(StaticDirectory::from_config(config)),
        DirectoryConfig::Http(config) => Arc::new(HttpDirectory::new(config)?),
    })
}

/// Directory held entirely in configuration
#[derive(Debug, Default)]
pub struct StaticDirectory {
    records: HashMap<String, CredentialRecord>,
}

impl StaticDirectory {
    pub fn from_config(config: &StaticDirectoryConfig) -> Self {
        let mut records = HashMap::new();

        for credential in &config.credentials {
            let Some(subscription) = config.subscriptions.get(&credential.subscription) else {
                tracing::warn!(subscription = %credential.subscription, "credential for unknown subscription ignored");
                continue;
            };

            let hash = match (&credential.key_sha256, &credential.key) {
                (Some(hash), _) => hash.to_ascii_lowercase(),
                (None, Some(key)) => credential_hash(key.expose_secret()),
                (None, None) => continue,
            };

            records.insert(
                hash,
                CredentialRecord {
                    subscription_id: credential.subscription.clone(),
                    plan_id: subscription.plan.clone(),
                    revoked: credential.revoked,
                    status: subscription.status,
                    expires_at: subscription.expires_at,
                },
            );
        }

        tracing::debug!(credentials = records.len(), "static directory loaded");

        Self { records }
    }
}

#[async_trait]
impl SubscriptionDirectory for StaticDirectory {
    async fn lookup(&self, credential_hash: &str) -> Result<Option<CredentialRecord>, AuthError> {
        Ok(self.records.get(credential_hash).cloned())
    }
}

/// Directory served by a remote account service
///
/// `POST {url}/internal/resolve-credential` with `{"credential_hash": ...}`;
/// 404 means the credential is unknown.
#[derive(Clone)]
pub struct HttpDirectory {
    http: reqwest::Client,
    url: url::Url,
    secret: SecretString,
}

impl std::fmt::Debug for HttpDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDirectory")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpDirectory {
    pub fn new(config: &HttpDirectoryConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            url: config.url.clone(),
            secret: config.secret.clone(),
        })
    }
}

#[async_trait]
impl SubscriptionDirectory for HttpDirectory {
    async fn lookup(&self, credential_hash: &str) -> Result<Option<CredentialRecord>, AuthError> {
        let url = self
            .url
            .join("internal/resolve-credential")
            .map_err(|e| AuthError::DirectoryStatus {
                status: 0,
                message: e.to_string(),
            })?;

        let response = self
            .http
            .post(url)
            .bearer_auth(self.secret.expose_secret())
            .json(&serde_json::json!({ "credential_hash": credential_hash }))
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::DirectoryStatus {
                status: status.as_u16(),
                message,
            });
        }

        let record = response.json::<CredentialRecord>().await?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn http_directory(server: &MockServer) -> HttpDirectory {
        HttpDirectory::new(&HttpDirectoryConfig {
            url: server.uri().parse().unwrap(),
            secret: SecretString::from("dir-secret"),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn http_directory_resolves_known_credential() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/internal/resolve-credential"))
            .and(header("authorization", "Bearer dir-secret"))
            .and(body_json(serde_json::json!({ "credential_hash": "abc123" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "subscription_id": "sub_9",
                "plan_id": "pro",
                "status": "trial",
                "expires_at": "2031-05-01"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = http_directory(&server).lookup("abc123").await.unwrap().unwrap();

        assert_eq!(record.subscription_id, "sub_9");
        assert_eq!(record.plan_id, "pro");
        assert_eq!(record.status, SubscriptionStatus::Trial);
        assert!(!record.revoked);
        assert_eq!(record.expires_at, Some(jiff::civil::date(2031, 5, 1)));
    }

    #[tokio::test]
    async fn http_directory_maps_404_to_unknown() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/internal/resolve-credential"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(http_directory(&server).lookup("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn http_directory_surfaces_server_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = http_directory(&server).lookup("x").await.unwrap_err();
        assert!(matches!(err, AuthError::DirectoryStatus { status: 500, ref message } if message == "boom"));
    }
}
