//! Plain JSON endpoint: `POST {endpoint}` with the prompt, any 2xx JSON back

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use switchyard_config::BackendConfig;
use switchyard_core::{Message, Prompt};

use super::{Backend, BackendReply};
use crate::InvokeError;

#[derive(Serialize)]
struct InvokeRequest<'a> {
    prompt: String,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// Backend speaking the generic JSON protocol
pub struct HttpBackend {
    name: String,
    client: reqwest::Client,
    url: url::Url,
    api_key: Option<SecretString>,
    model: Option<String>,
}

impl HttpBackend {
    pub fn new(name: &str, config: &BackendConfig) -> Result<Self, InvokeError> {
        Ok(Self {
            name: name.to_owned(),
            client: super::client(config)?,
            url: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

/// First string field among the usual output names
fn output_of(body: &serde_json::Value) -> Option<String> {
    ["output", "text", "content", "response"]
        .iter()
        .find_map(|field| body.get(field).and_then(serde_json::Value::as_str))
        .map(str::to_owned)
}

#[async_trait]
impl Backend for HttpBackend {
    async fn invoke(&self, prompt: &Prompt) -> Result<BackendReply, InvokeError> {
        let request = InvokeRequest {
            prompt: prompt.full_text(),
            messages: &prompt.messages,
            model: self.model.as_deref(),
        };

        let mut builder = self.client.post(self.url.clone()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(backend = %self.name, error = %e, "upstream request failed");
            InvokeError::from(e)
        })?;

        let body: serde_json::Value = super::check_status(response).await?.json().await?;

        Ok(BackendReply {
            output: output_of(&body),
            body,
        })
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("name", &self.name)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}
