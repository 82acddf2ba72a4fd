use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use http::HeaderMap;
use serde::Deserialize;
use switchyard_broker::{Broker, BrokerError, InferRequest, InferResponse};
use switchyard_core::{Message, Prompt, RoutingMode};

use crate::error::ApiError;

/// Body of `POST /v1/infer`
///
/// Exactly one of `prompt` (a single user turn) or `messages` is required.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct InferBody {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    messages: Option<Vec<Message>>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    mode: Option<RoutingMode>,
    #[serde(default)]
    cost_units: Option<u32>,
}

impl TryFrom<InferBody> for InferRequest {
    type Error = ApiError;

    fn try_from(body: InferBody) -> Result<Self, Self::Error> {
        let prompt = match (body.prompt, body.messages) {
            (Some(text), None) => Prompt::text(text),
            (None, Some(messages)) => Prompt { messages },
            (Some(_), Some(_)) => {
                return Err(ApiError::InvalidRequest("set either prompt or messages, not both".into()));
            }
            (None, None) => return Err(ApiError::InvalidRequest("prompt or messages is required".into())),
        };

        if prompt.messages.is_empty() || prompt.char_len() == 0 {
            return Err(ApiError::InvalidRequest("prompt is empty".into()));
        }

        if body.cost_units == Some(0) {
            return Err(ApiError::InvalidRequest("cost_units must be at least 1".into()));
        }

        Ok(Self {
            prompt,
            session_id: body.session_id.filter(|s| !s.is_empty()),
            mode: body.mode,
            cost_units: body.cost_units,
        })
    }
}

/// Bearer token from the `Authorization` header
fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub(crate) async fn infer_handler(
    State(broker): State<Broker>,
    headers: HeaderMap,
    body: Result<Json<InferBody>, JsonRejection>,
) -> Result<Json<InferResponse>, ApiError> {
    let credential = bearer(&headers).ok_or(BrokerError::Unauthorized)?;
    let Json(body) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let response = broker.infer(credential, body.try_into()?).await?;

    Ok(Json(response))
}
