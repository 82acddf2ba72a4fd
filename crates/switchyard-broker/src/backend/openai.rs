//! OpenAI-compatible chat completions

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use switchyard_config::BackendConfig;
use switchyard_core::{Message, Prompt};

use super::{Backend, BackendReply};
use crate::InvokeError;

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [Message],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible backend
pub struct OpenAiBackend {
    name: String,
    client: reqwest::Client,
    url: String,
    api_key: Option<SecretString>,
    model: Option<String>,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn new(name: &str, config: &BackendConfig) -> Result<Self, InvokeError> {
        Ok(Self {
            name: name.to_owned(),
            client: super::client(config)?,
            url: super::endpoint(&config.endpoint, "chat/completions"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn invoke(&self, prompt: &Prompt) -> Result<BackendReply, InvokeError> {
        let request = ChatRequest {
            model: self.model.as_deref(),
            messages: &prompt.messages,
            max_tokens: self.max_tokens,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(backend = %self.name, error = %e, "upstream request failed");
            InvokeError::from(e)
        })?;

        let body: serde_json::Value = super::check_status(response).await?.json().await?;
        let parsed = ChatResponse::deserialize(&body).map_err(|e| InvokeError::Decode(e.to_string()))?;
        let output = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);

        Ok(BackendReply { output, body })
    }
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
