//! Anthropic Messages API

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use switchyard_config::BackendConfig;
use switchyard_core::{Prompt, Role};

use super::{Backend, BackendReply};
use crate::InvokeError;

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API backend
pub struct AnthropicBackend {
    name: String,
    client: reqwest::Client,
    url: String,
    api_key: Option<SecretString>,
    model: Option<String>,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(name: &str, config: &BackendConfig) -> Result<Self, InvokeError> {
        Ok(Self {
            name: name.to_owned(),
            client: super::client(config)?,
            url: super::endpoint(&config.endpoint, "messages"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

/// System turns go in the top-level `system` field
fn to_wire(prompt: &Prompt) -> (Option<String>, Vec<WireMessage<'_>>) {
    let system: Vec<&str> = prompt
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let messages = prompt
        .messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => return None,
            };
            Some(WireMessage {
                role,
                content: &m.content,
            })
        })
        .collect();

    let system = (!system.is_empty()).then(|| system.join("\n"));
    (system, messages)
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn invoke(&self, prompt: &Prompt) -> Result<BackendReply, InvokeError> {
        let (system, messages) = to_wire(prompt);
        let request = MessagesRequest {
            model: self.model.as_deref(),
            max_tokens: self.max_tokens,
            system,
            messages,
        };

        let mut builder = self
            .client
            .post(&self.url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(backend = %self.name, error = %e, "upstream request failed");
            InvokeError::from(e)
        })?;

        let body: serde_json::Value = super::check_status(response).await?.json().await?;
        let parsed = MessagesResponse::deserialize(&body).map_err(|e| InvokeError::Decode(e.to_string()))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        Ok(BackendReply {
            output: (!text.is_empty()).then_some(text),
            body,
        })
    }
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use switchyard_core::Message;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn lifts_system_turns_and_joins_text_blocks() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-sonnet",
                "system": "be brief",
                "messages": [{ "role": "user", "content": "review this" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    { "type": "text", "text": "looks " },
                    { "type": "text", "text": "fine" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let raw = format!(
            indoc! {r#"
                type = "anthropic"
                endpoint = "{}/v1/"
                api_key = "ak-test"
                model = "claude-sonnet"
                tier = "premium"
            "#},
            server.uri()
        );
        let backend = AnthropicBackend::new("claude", &toml::from_str(&raw).unwrap()).unwrap();

        let prompt = Prompt {
            messages: vec![
                Message {
                    role: Role::System,
                    content: "be brief".into(),
                },
                Message {
                    role: Role::User,
                    content: "review this".into(),
                },
            ],
        };

        let reply = backend.invoke(&prompt).await.unwrap();
        assert_eq!(reply.output.as_deref(), Some("looks fine"));
    }
}
