//! Backend invocation and the providers that implement it

mod anthropic;
mod generic;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use switchyard_config::{BackendConfig, ProviderKind};
use switchyard_core::{BackendId, Prompt};

pub use anthropic::AnthropicBackend;
pub use generic::HttpBackend;
pub use openai::OpenAiBackend;

use crate::InvokeError;

/// Successful answer from a backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendReply {
    /// Generated text, when the protocol carries one
    pub output: Option<String>,
    /// Upstream body as received
    pub body: serde_json::Value,
}

/// Something that can run a prompt
///
/// Implementations do not enforce timeouts themselves; the executor bounds
/// each call with the backend's configured timeout.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn invoke(&self, prompt: &Prompt) -> Result<BackendReply, InvokeError>;
}

/// Invokable backends keyed by id
pub type BackendSet = IndexMap<BackendId, Arc<dyn Backend>>;

/// Build one backend per configured entry
pub fn build_backends(configs: &IndexMap<String, BackendConfig>) -> Result<BackendSet, InvokeError> {
    configs
        .iter()
        .map(|(id, config)| {
            let backend: Arc<dyn Backend> = match config.provider {
                ProviderKind::Openai => Arc::new(OpenAiBackend::new(id, config)?),
                ProviderKind::Anthropic => Arc::new(AnthropicBackend::new(id, config)?),
                ProviderKind::Http => Arc::new(HttpBackend::new(id, config)?),
            };
            Ok((BackendId::from(id.as_str()), backend))
        })
        .collect()
}

/// Shared HTTP client for a backend
fn client(config: &BackendConfig) -> Result<reqwest::Client, InvokeError> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| InvokeError::Config(e.to_string()))
}

/// `base` with `path` appended, keeping any path prefix of `base`
fn endpoint(base: &url::Url, path: &str) -> String {
    let base = base.as_str().trim_end_matches('/');
    format!("{base}/{path}")
}

/// Turn a non-success response into an error
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, InvokeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(InvokeError::Status {
        status: status.as_u16(),
        body,
    })
}
