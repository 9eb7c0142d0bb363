use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::provider::{
    api_error, build_client, decode_arguments, parse_body, post_json, role_content_messages,
    AiProvider, CallResult, ModelInfo, ProviderHooks, RawResponse, TracingHooks,
};
use super::schema::{to_provider_schema, ToolSchema};
use super::settings::{AiProviderType, ProviderConfig};
use crate::models::error::{AgentError, Result};
use crate::models::message::Message;

/// OpenAI chat completions provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    api_url: String,
    org_id: Option<String>,
    reasoning_effort: Option<String>,
    system_prompt: Option<String>,
    schema: Option<ToolSchema>,
    hooks: Arc<dyn ProviderHooks>,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let provider = AiProviderType::OpenAi;
        Ok(Self {
            client: build_client(provider)?,
            api_key: config.api_key.clone(),
            model: config.resolved_model(provider),
            max_tokens: config.resolved_max_tokens(provider),
            api_url: config.resolved_api_url(provider),
            org_id: config
                .setting("org_id")
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            reasoning_effort: config
                .setting("reasoning_effort")
                .filter(|effort| !effort.is_empty())
                .map(str::to_string),
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
            // Newer models take instructions under the developer role
            messages.push(json!({ "role": "developer", "content": system }));
        }
        messages.extend(role_content_messages(conversation));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_completion_tokens": max_tokens,
        });

        if let Some(effort) = &self.reasoning_effort {
            body["reasoning_effort"] = json!(effort);
        }

        if let Some(schema) = schema {
            body["tools"] = json!([to_provider_schema(schema, AiProviderType::OpenAi)?]);
            body["tool_choice"] = json!({
                "type": "function",
                "function": { "name": schema.name },
            });
        }

        Ok(body)
    }

    pub(crate) fn parse_response(raw: &RawResponse) -> Result<CallResult> {
        if !raw.is_success() {
            return Err(api_error(raw.status, &raw.body));
        }

        let value = parse_body(AiProviderType::OpenAi, &raw.body)?;
        let response: ChatResponse = serde_json::from_value(value)
            .map_err(|e| AgentError::MalformedResponse(format!("unexpected OpenAI envelope: {}", e)))?;

        if let Some(usage) = &response.usage {
            info!(
                "OpenAI usage: prompt={} completion={} total={}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        chat_choice_result(AiProviderType::OpenAi, response)
    }
}

// Chat completion types, shared with DeepSeek

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatToolCall {
    pub function: ChatFunctionCall,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatFunctionCall {
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

/// First choice as a call result: tool-call arguments when present, the
/// message content otherwise
pub(crate) fn chat_choice_result(provider: AiProviderType, response: ChatResponse) -> Result<CallResult> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::EmptyResponse(format!("{}: no choices", provider)))?;

    let arguments = choice
        .message
        .tool_calls
        .and_then(|calls| calls.into_iter().next())
        .map(|call| call.function.arguments)
        .filter(|arguments| match arguments {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        });

    if let Some(arguments) = arguments {
        return Ok(CallResult::Structured(decode_arguments(provider, &arguments)?));
    }

    match choice.message.content {
        Some(content) => Ok(CallResult::Text(content)),
        None => Err(AgentError::EmptyResponse(format!(
            "{}: message has neither content nor tool calls",
            provider
        ))),
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn provider_type(&self) -> AiProviderType {
        AiProviderType::OpenAi
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: AiProviderType::OpenAi,
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

        info!("Sending request to OpenAI model '{}'", self.model);

        let mut request = self.client.post(&self.api_url).bearer_auth(&self.api_key);
        if let Some(org_id) = &self.org_id {
            request = request.header("OpenAI-Organization", org_id);
        }

        let raw = post_json(request, &body, self.hooks.as_ref(), AiProviderType::OpenAi).await?;
        Self::parse_response(&raw)
    }
}
