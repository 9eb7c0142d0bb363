use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::openai::{chat_choice_result, ChatResponse};
use super::provider::{
    api_error, build_client, parse_body, post_json, role_content_messages, AiProvider, CallResult,
    ModelInfo, ProviderHooks, RawResponse, TracingHooks,
};
use super::schema::{to_provider_schema, ToolSchema};
use super::settings::{AiProviderType, ProviderConfig};
use crate::models::error::{AgentError, Result};
use crate::models::message::Message;

/// DeepSeek provider (OpenAI-compatible chat completions)
pub struct DeepSeekProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    api_url: String,
    system_prompt: Option<String>,
    schema: Option<ToolSchema>,
    hooks: Arc<dyn ProviderHooks>,
}

impl DeepSeekProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let provider = AiProviderType::DeepSeek;
        Ok(Self {
            client: build_client(provider)?,
            api_key: config.api_key.clone(),
            model: config.resolved_model(provider),
            max_tokens: config.resolved_max_tokens(provider),
            api_url: config.resolved_api_url(provider),
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
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if let Some(system) = &self.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(role_content_messages(conversation));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
        });

        if let Some(schema) = schema {
            body["tools"] = json!([to_provider_schema(schema, AiProviderType::DeepSeek)?]);
            body["tool_choice"] = json!({
                "type": "function",
                "function": { "name": schema.name },
            });
        }

        Ok(body)
    }

    pub(crate) fn parse_response(raw: &RawResponse) -> Result<CallResult> {
        // DeepSeek sheds load with 503 as well as 429
        if matches!(raw.status, 429 | 503) {
            warn!("DeepSeek rate limited (status {})", raw.status);
            return Err(AgentError::RateLimit { status: raw.status });
        }
        if !raw.is_success() {
            return Err(api_error(raw.status, &raw.body));
        }

        let value = parse_body(AiProviderType::DeepSeek, &raw.body)?;
        let response: ChatResponse = serde_json::from_value(value)
            .map_err(|e| AgentError::MalformedResponse(format!("unexpected DeepSeek envelope: {}", e)))?;

        if let Some(usage) = &response.usage {
            info!(
                "DeepSeek usage: prompt={} completion={} total={}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        chat_choice_result(AiProviderType::DeepSeek, response)
    }
}

#[async_trait]
impl AiProvider for DeepSeekProvider {
    fn provider_type(&self) -> AiProviderType {
        AiProviderType::DeepSeek
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: AiProviderType::DeepSeek,
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

        info!("Sending request to DeepSeek model '{}'", self.model);

        let request = self.client.post(&self.api_url).bearer_auth(&self.api_key);
        let raw = post_json(request, &body, self.hooks.as_ref(), AiProviderType::DeepSeek).await?;
        Self::parse_response(&raw)
    }
}
