use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::provider::{
    api_error, build_client, parse_body, post_json, role_content_messages, AiProvider, CallResult,
    ModelInfo, ProviderHooks, RawResponse, TracingHooks,
};
use super::schema::{to_provider_schema, ToolSchema};
use super::settings::{AiProviderType, ProviderConfig};
use crate::models::error::{AgentError, Result};
use crate::models::message::Message;

const DEFAULT_VERSION: &str = "2023-06-01";
const DEFAULT_BETA: &str = "prompt-caching-2024-07-31";

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    api_url: String,
    version: String,
    beta: String,
    system_prompt: Option<String>,
    schema: Option<ToolSchema>,
    hooks: Arc<dyn ProviderHooks>,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let provider = AiProviderType::Anthropic;
        Ok(Self {
            client: build_client(provider)?,
            api_key: config.api_key.clone(),
            model: config.resolved_model(provider),
            max_tokens: config.resolved_max_tokens(provider),
            api_url: config.resolved_api_url(provider),
            version: config.setting("version").unwrap_or(DEFAULT_VERSION).to_string(),
            beta: config.setting("beta").unwrap_or(DEFAULT_BETA).to_string(),
            system_prompt: config.system_prompt.clone(),
            schema: config.schema.clone(),
            hooks: Arc::new(TracingHooks),
        })
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ProviderHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    fn build_body(
        &self,
        conversation: &[Message],
        schema: Option<&ToolSchema>,
        max_tokens: u32,
    ) -> Result<Value> {
        let mut body = json!({
            "model": self.model,
            "messages": role_content_messages(conversation),
            "max_tokens": max_tokens,
        });

        if let Some(system) = &self.system_prompt {
            body["system"] = json!([{ "type": "text", "text": system }]);
        }

        if let Some(schema) = schema {
            body["tools"] = json!([to_provider_schema(schema, AiProviderType::Anthropic)?]);
            body["tool_choice"] = json!({ "type": "tool", "name": schema.name });
        }

        Ok(body)
    }

    pub(crate) fn parse_response(raw: &RawResponse) -> Result<CallResult> {
        if !raw.is_success() {
            return Err(api_error(raw.status, &raw.body));
        }

        let value = parse_body(AiProviderType::Anthropic, &raw.body)?;
        let response: AnthropicResponse = serde_json::from_value(value)
            .map_err(|e| AgentError::MalformedResponse(format!("unexpected Anthropic envelope: {}", e)))?;

        if let Some(usage) = &response.usage {
            info!(
                "Anthropic usage: {} input / {} output tokens",
                usage.input_tokens, usage.output_tokens
            );
        }

        if response.content.is_empty() {
            return Err(AgentError::EmptyResponse("Anthropic: empty content".to_string()));
        }

        // A tool_use block wins over any text blocks around it
        let tool_input = response.content.iter().find_map(|block| match block {
            AnthropicContentBlock::ToolUse { input, .. } => Some(input.clone()),
            _ => None,
        });
        if let Some(input) = tool_input {
            return Ok(CallResult::Structured(input));
        }

        response
            .content
            .into_iter()
            .find_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(CallResult::Text(text)),
                _ => None,
            })
            .ok_or_else(|| {
                AgentError::EmptyResponse("Anthropic: no text or tool_use content".to_string())
            })
    }
}

// Anthropic API types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

/// Response content block
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[allow(dead_code)]
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: i64,
    output_tokens: i64,
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn provider_type(&self) -> AiProviderType {
        AiProviderType::Anthropic
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: AiProviderType::Anthropic,
            model: self.model.clone(),
            max_tokens: self.max_tokens,
        }
    }

    async fn call(
        &self,
        conversation: &[Message],
        schema: Option<&ToolSchema>,
        allowed_tokens: Option<u32>,
    ) -> Result<CallResult> {
        let schema = schema.or(self.schema.as_ref());
        let body = self.build_body(conversation, schema, allowed_tokens.unwrap_or(self.max_tokens))?;

        info!(
            "Sending request to Anthropic model '{}' (tool={})",
            self.model,
            schema.map(|s| s.name.as_str()).unwrap_or("none")
        );

        let request = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .header("anthropic-beta", &self.beta);

        let raw = post_json(request, &body, self.hooks.as_ref(), AiProviderType::Anthropic).await?;
        Self::parse_response(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::schema::{InputSpec, InputType};

    fn raw(status: u16, body: Value) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    fn provider(config: ProviderConfig) -> AnthropicProvider {
        AnthropicProvider::new(&config).unwrap()
    }

    #[test]
    fn test_body_places_system_prompt_and_pins_tool() {
        let schema = ToolSchema::new("respond", "d", vec![InputSpec::new("a", InputType::String)]);
        let provider = provider(ProviderConfig::new("anthropic", "k").with_system_prompt("be brief"));
        let body = provider
            .build_body(&[Message::user("hi")], Some(&schema), 100)
            .unwrap();

        assert_eq!(body["model"], "claude-3-7-sonnet-20250219");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["system"], json!([{"type": "text", "text": "be brief"}]));
        assert_eq!(body["messages"], json!([{"role": "user", "content": "hi"}]));
        assert_eq!(body["tools"][0]["name"], "respond");
        assert_eq!(body["tool_choice"], json!({"type": "tool", "name": "respond"}));
    }

    #[test]
    fn test_body_without_schema_has_no_tools() {
        let provider = provider(ProviderConfig::new("anthropic", "k"));
        let body = provider.build_body(&[Message::user("hi")], None, 10).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_tool_use_block_wins() {
        let result = AnthropicProvider::parse_response(&raw(
            200,
            json!({"content": [
                {"type": "text", "text": "thinking out loud"},
                {"type": "tool_use", "id": "t1", "name": "respond", "input": {"action": "message"}}
            ]}),
        ))
        .unwrap();
        assert_eq!(result, CallResult::Structured(json!({"action": "message"})));
    }

    #[test]
    fn test_text_block_fallback() {
        let result = AnthropicProvider::parse_response(&raw(
            200,
            json!({"content": [{"type": "thinking", "thinking": "..."}, {"type": "text", "text": "hello"}]}),
        ))
        .unwrap();
        assert_eq!(result, CallResult::Text("hello".to_string()));
    }

    #[test]
    fn test_empty_content_is_error() {
        let err = AnthropicProvider::parse_response(&raw(200, json!({"content": []}))).unwrap_err();
        assert!(matches!(err, AgentError::EmptyResponse(_)));
    }

    #[test]
    fn test_no_usable_block_is_error() {
        let err = AnthropicProvider::parse_response(&raw(200, json!({"content": [{"type": "thinking"}]})))
            .unwrap_err();
        assert!(matches!(err, AgentError::EmptyResponse(_)));
    }

    #[test]
    fn test_http_error_carries_status_and_message() {
        let err = AnthropicProvider::parse_response(&raw(
            400,
            json!({"type": "error", "error": {"type": "invalid_request_error", "message": "max_tokens too large"}}),
        ))
        .unwrap_err();
        assert!(matches!(err, AgentError::Api { status: 400, ref message } if message == "max_tokens too large"));
    }

    #[test]
    fn test_model_info_uses_overrides() {
        let provider = provider(ProviderConfig {
            model: Some("claude-x".to_string()),
            max_tokens: Some(2048),
            ..ProviderConfig::new("anthropic", "k")
        });
        let info = provider.model_info();
        assert_eq!(info.provider, AiProviderType::Anthropic);
        assert_eq!(info.model, "claude-x");
        assert_eq!(info.max_tokens, 2048);
    }
}
