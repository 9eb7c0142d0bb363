use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::schema::ToolSchema;
use super::settings::AiProviderType;
use crate::models::error::{AgentError, Result};
use crate::models::message::Message;

/// Outcome of one provider call
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    /// Free-form reply
    Text(String),
    /// Decoded tool-call arguments
    Structured(Value),
}

impl CallResult {
    /// JSON encoding used when the turn is recorded in the conversation
    pub fn to_json_string(&self) -> String {
        match self {
            CallResult::Text(text) => Value::String(text.clone()).to_string(),
            CallResult::Structured(value) => value.to_string(),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, CallResult::Structured(_))
    }
}

/// Model information reported by an adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub provider: AiProviderType,
    pub model: String,
    pub max_tokens: u32,
}

/// Audit hooks around every HTTP exchange
pub trait ProviderHooks: Send + Sync {
    fn before_request(&self, _provider: AiProviderType, _body: &Value) {}

    fn after_response(&self, _provider: AiProviderType, _status: u16, _body: &str) {}

    /// The exchange failed before a response body was read
    fn on_error(&self, _provider: AiProviderType, _error: &AgentError) {}
}

/// Default hooks: request and response bodies go to the debug log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

impl ProviderHooks for TracingHooks {
    fn before_request(&self, provider: AiProviderType, body: &Value) {
        debug!("{} REQUEST: {}", provider.as_str().to_uppercase(), body);
    }

    fn after_response(&self, provider: AiProviderType, status: u16, body: &str) {
        debug!(
            "{} RESPONSE - Status: {}\n{}",
            provider.as_str().to_uppercase(),
            status,
            body
        );
    }

    fn on_error(&self, provider: AiProviderType, error: &AgentError) {
        warn!("{} REQUEST FAILED: {}", provider.as_str().to_uppercase(), error);
    }
}

/// Trait for AI providers
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Get the provider type
    fn provider_type(&self) -> AiProviderType;

    /// Provider, model and token limit in use
    fn model_info(&self) -> ModelInfo;

    /// Send the conversation and return the normalized result.
    ///
    /// `schema` overrides the configured schema for this call; when one is in
    /// effect the provider is pinned to that single tool.
    async fn call(
        &self,
        conversation: &[Message],
        schema: Option<&ToolSchema>,
        allowed_tokens: Option<u32>,
    ) -> Result<CallResult>;
}

/// Status and raw body of one HTTP exchange
#[derive(Debug, Clone)]
pub(crate) struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub(crate) fn build_client(provider: AiProviderType) -> Result<Client> {
    Ok(Client::builder()
        .timeout(provider.request_timeout())
        .connect_timeout(Duration::from_secs(30))
        .build()?)
}

/// POST a JSON body and collect the raw response, running the audit hooks
pub(crate) async fn post_json(
    request: RequestBuilder,
    body: &Value,
    hooks: &dyn ProviderHooks,
    provider: AiProviderType,
) -> Result<RawResponse> {
    hooks.before_request(provider, body);

    match send_json(request, body).await {
        Ok(raw) => {
            hooks.after_response(provider, raw.status, &raw.body);
            Ok(raw)
        }
        Err(e) => {
            hooks.on_error(provider, &e);
            Err(e)
        }
    }
}

async fn send_json(request: RequestBuilder, body: &Value) -> Result<RawResponse> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await?;
    let status = response.status().as_u16();
    let text = response.text().await?;
    Ok(RawResponse { status, body: text })
}

/// Error for a non-success status, preferring the provider's `error.message`
pub(crate) fn api_error(status: u16, body: &str) -> AgentError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());

    AgentError::Api { status, message }
}

/// Parse a success body, which must be JSON
pub(crate) fn parse_body(provider: AiProviderType, body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| {
        AgentError::MalformedResponse(format!("invalid JSON from {}: {}", provider, e))
    })
}

/// Tool-call arguments arrive JSON-encoded as a string (OpenAI style) or,
/// from some endpoints, already as an object
pub(crate) fn decode_arguments(provider: AiProviderType, arguments: &Value) -> Result<Value> {
    match arguments {
        Value::String(encoded) => serde_json::from_str(encoded).map_err(|e| {
            AgentError::MalformedResponse(format!(
                "{} tool call arguments are not valid JSON: {}",
                provider, e
            ))
        }),
        other => Ok(other.clone()),
    }
}

/// Conversation in the `{role, content}` shape shared by most providers
pub(crate) fn role_content_messages(conversation: &[Message]) -> Vec<Value> {
    conversation
        .iter()
        .map(|message| {
            serde_json::json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        })
        .collect()
}
