use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use switchyard_config::{HttpLedgerConfig, LedgerConfig};
use switchyard_core::{BackendId, UsageRecord};
use url::Url;

use crate::BillingError;

/// Destination that accepts batches of usage records
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Deliver one batch; an error makes the recorder retry the whole batch
    async fn write(&self, records: &[UsageRecord]) -> Result<(), BillingError>;
}

/// Build the ledger selected by configuration
pub fn build_sink(config: &LedgerConfig) -> Result<Arc<dyn UsageSink>, BillingError> {
    Ok(match config {
        LedgerConfig::Log => Arc::new(LogLedger),
        LedgerConfig::Http(config) => Arc::new(HttpLedger::new(config)?),
    })
}

/// Emits each record as a structured log event under the `usage` target
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLedger;

#[async_trait]
impl UsageSink for LogLedger {
    async fn write(&self, records: &[UsageRecord]) -> Result<(), BillingError> {
        for record in records {
            tracing::info!(
                target: "usage",
                request_id = %record.request_id,
                subscription_id = %record.subscription_id,
                plan_id = %record.plan_id,
                backend_id = record.backend_id.as_ref().map(BackendId::as_str),
                category = %record.category,
                cost_units = record.cost_units,
                outcome = ?record.outcome,
                attempt_count = record.attempt_count,
                latency_ms = record.latency_ms,
                error = record.error.as_deref(),
                timestamp = %record.timestamp,
                "usage recorded"
            );
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct UsageBatch<'a> {
    records: &'a [UsageRecord],
}

/// Posts batches to a billing service
///
/// `POST {url}` with `{"records": [...]}` and a bearer secret. Records carry
/// their `request_id`, so the receiver can discard redeliveries.
#[derive(Clone)]
pub struct HttpLedger {
    http: reqwest::Client,
    url: Url,
    secret: SecretString,
}

impl HttpLedger {
    pub fn new(config: &HttpLedgerConfig) -> Result<Self, BillingError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            url: config.url.clone(),
            secret: config.secret.clone(),
        })
    }
}

impl std::fmt::Debug for HttpLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLedger")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl UsageSink for HttpLedger {
    async fn write(&self, records: &[UsageRecord]) -> Result<(), BillingError> {
        let response = self
            .http
            .post(self.url.clone())
            .bearer_auth(self.secret.expose_secret())
            .json(&UsageBatch { records })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(BillingError::Api { status, message })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use switchyard_core::{Category, Outcome};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn record() -> UsageRecord {
        UsageRecord {
            request_id: uuid::Uuid::new_v4(),
            subscription_id: "sub_1".to_owned(),
            plan_id: "pro".to_owned(),
            backend_id: Some("fast".into()),
            category: Category::Simple,
            cost_units: 1,
            outcome: Outcome::Success,
            attempt_count: 1,
            latency_ms: 120,
            error: None,
            timestamp: jiff::Timestamp::now(),
        }
    }

    fn ledger(server: &MockServer) -> HttpLedger {
        HttpLedger::new(&HttpLedgerConfig {
            url: format!("{}/usage/batch", server.uri()).parse().unwrap(),
            secret: SecretString::from("ledger-key"),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn http_ledger_posts_batch() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/usage/batch"))
            .and(header("authorization", "Bearer ledger-key"))
            .and(body_partial_json(serde_json::json!({
                "records": [{ "subscription_id": "sub_1", "backend_id": "fast", "outcome": "success" }]
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        ledger(&server).write(&[record()]).await.unwrap();
    }

    #[tokio::test]
    async fn http_ledger_surfaces_rejections() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("ledger down"))
            .mount(&server)
            .await;

        let err = ledger(&server).write(&[record()]).await.unwrap_err();
        assert!(matches!(err, BillingError::Api { status: 500, ref message } if message == "ledger down"));
    }

    #[tokio::test]
    async fn log_ledger_accepts_everything() {
        LogLedger.write(&[record(), record()]).await.unwrap();
    }
}
