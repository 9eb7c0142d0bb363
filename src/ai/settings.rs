use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::schema::ToolSchema;
use crate::models::error::AgentError;

/// AI provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProviderType {
    Anthropic,
    OpenAi,
    Gemini,
    DeepSeek,
}

impl AiProviderType {
    pub const ALL: [AiProviderType; 4] = [
        AiProviderType::Anthropic,
        AiProviderType::OpenAi,
        AiProviderType::Gemini,
        AiProviderType::DeepSeek,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-7-sonnet-20250219",
            Self::OpenAi => "gpt-4-turbo",
            Self::Gemini => "gemini-1.5-pro",
            Self::DeepSeek => "deepseek-reasoner",
        }
    }

    pub fn default_token_limit(&self) -> u32 {
        match self {
            Self::Anthropic => 8192,
            Self::OpenAi => 4096,
            Self::Gemini => 4096,
            Self::DeepSeek => 8000,
        }
    }

    /// Completion endpoint. For Gemini this is the models prefix the model
    /// name and `:generateContent` are appended to.
    pub fn default_api_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com/v1/messages",
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/models/",
            Self::DeepSeek => "https://api.deepseek.com/beta/chat/completions",
        }
    }

    /// Request timeout for one completion call
    pub fn request_timeout(&self) -> Duration {
        match self {
            Self::OpenAi => Duration::from_secs(300),
            Self::Anthropic | Self::Gemini | Self::DeepSeek => Duration::from_secs(400),
        }
    }
}

impl std::fmt::Display for AiProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiProviderType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "deepseek" => Ok(Self::DeepSeek),
            _ => Err(AgentError::UnknownProvider(s.to_string())),
        }
    }
}

/// Everything needed to construct a provider adapter.
///
/// `None` fields fall back to the provider's defaults.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub api_url: Option<String>,
    pub system_prompt: Option<String>,
    pub schema: Option<ToolSchema>,
    /// Provider-only knobs such as `version`/`beta` (Anthropic) or `org_id` (OpenAI)
    pub provider_specific: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn new(provider_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_schema(mut self, schema: ToolSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.provider_specific.get(key).map(String::as_str)
    }

    pub(crate) fn resolved_model(&self, provider: AiProviderType) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    pub(crate) fn resolved_max_tokens(&self, provider: AiProviderType) -> u32 {
        self.max_tokens.unwrap_or_else(|| provider.default_token_limit())
    }

    pub(crate) fn resolved_api_url(&self, provider: AiProviderType) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| provider.default_api_url().to_string())
    }
}
