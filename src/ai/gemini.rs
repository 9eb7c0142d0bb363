use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::provider::{
    api_error, build_client, parse_body, post_json, AiProvider, CallResult, ModelInfo,
    ProviderHooks, RawResponse, TracingHooks,
};
use super::schema::{to_provider_schema, ToolSchema};
use super::settings::{AiProviderType, ProviderConfig};
use crate::models::error::{AgentError, Result};
use crate::models::message::{Message, Role};

/// Google Gemini generateContent provider
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    api_url: String,
    system_prompt: Option<String>,
    schema: Option<ToolSchema>,
    hooks: Arc<dyn ProviderHooks>,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let provider = AiProviderType::Gemini;
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

    /// `{models prefix}{model}:generateContent`; the key goes in the query
    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        )
    }

    fn build_body(
        &self,
        conversation: &[Message],
        schema: Option<&ToolSchema>,
        max_tokens: u32,
    ) -> Result<Value> {
        let contents: Vec<Value> = conversation
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                json!({ "role": role, "parts": [{ "text": message.content }] })
            })
            .collect();

        let mut generation_config = json!({ "maxOutputTokens": max_tokens });
        if let Some(schema) = schema {
            generation_config["responseMimeType"] = json!("application/json");
            generation_config["responseSchema"] = to_provider_schema(schema, AiProviderType::Gemini)?;
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });

        if let Some(system) = &self.system_prompt {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        Ok(body)
    }

    /// With a response schema in effect the text is expected to be JSON
    pub(crate) fn parse_response(raw: &RawResponse, expects_json: bool) -> Result<CallResult> {
        if !raw.is_success() {
            return Err(api_error(raw.status, &raw.body));
        }

        let value = parse_body(AiProviderType::Gemini, &raw.body)?;
        let response: GeminiResponse = serde_json::from_value(value)
            .map_err(|e| AgentError::MalformedResponse(format!("unexpected Gemini envelope: {}", e)))?;

        if let Some(usage) = &response.usage_metadata {
            info!(
                "Gemini usage: prompt={} candidates={} total={}",
                usage.prompt_token_count, usage.candidates_token_count, usage.total_token_count
            );
        }

        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .ok_or_else(|| AgentError::EmptyResponse("Gemini: no candidate content".to_string()))?;

        if expects_json {
            match serde_json::from_str::<Value>(&text) {
                Ok(structured) => return Ok(CallResult::Structured(structured)),
                Err(e) => warn!("Gemini returned non-JSON text despite a response schema: {}", e),
            }
        }

        Ok(CallResult::Text(text))
    }
}

// Gemini API types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeminiUsage {
    prompt_token_count: i64,
    candidates_token_count: i64,
    total_token_count: i64,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn provider_type(&self) -> AiProviderType {
        AiProviderType::Gemini
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: AiProviderType::Gemini,
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

        info!("Sending request to Gemini model '{}'", self.model);

        let request = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())]);

        let raw = post_json(request, &body, self.hooks.as_ref(), AiProviderType::Gemini).await?;
        Self::parse_response(&raw, schema.is_some())
    }
}
