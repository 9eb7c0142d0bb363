//! AI Provider Module
//!
//! One adapter per supported model provider behind the [`AiProvider`] trait,
//! plus the schema lowering they share. Providers are looked up by id through
//! the registry functions below.

mod anthropic;
mod deepseek;
mod gemini;
mod openai;
mod provider;
mod schema;
mod settings;

// Provider implementations
pub use anthropic::AnthropicProvider;
pub use deepseek::DeepSeekProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

// Common provider types
pub use provider::{AiProvider, CallResult, ModelInfo, ProviderHooks, TracingHooks};

// Schemas
pub use schema::{to_provider_schema, InputSpec, InputType, SchemaFamily, ToolSchema};

// Settings
pub use settings::{AiProviderType, ProviderConfig};

use std::sync::Arc;

use crate::models::error::Result;

/// Create an AI provider for `config.provider_id`
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn AiProvider>> {
    create_provider_with_hooks(config, Arc::new(TracingHooks))
}

/// Create an AI provider whose HTTP exchanges go through `hooks`
pub fn create_provider_with_hooks(
    config: &ProviderConfig,
    hooks: Arc<dyn ProviderHooks>,
) -> Result<Arc<dyn AiProvider>> {
    let provider: AiProviderType = config.provider_id.parse()?;
    Ok(match provider {
        AiProviderType::Anthropic => Arc::new(AnthropicProvider::new(config)?.with_hooks(hooks)),
        AiProviderType::OpenAi => Arc::new(OpenAiProvider::new(config)?.with_hooks(hooks)),
        AiProviderType::Gemini => Arc::new(GeminiProvider::new(config)?.with_hooks(hooks)),
        AiProviderType::DeepSeek => Arc::new(DeepSeekProvider::new(config)?.with_hooks(hooks)),
    })
}

/// Ids of every registered provider
pub fn available_providers() -> Vec<&'static str> {
    AiProviderType::ALL.iter().map(AiProviderType::as_str).collect()
}

pub fn default_model(provider_id: &str) -> Result<&'static str> {
    Ok(provider_id.parse::<AiProviderType>()?.default_model())
}

pub fn default_token_limit(provider_id: &str) -> Result<u32> {
    Ok(provider_id.parse::<AiProviderType>()?.default_token_limit())
}

pub fn provider_url(provider_id: &str) -> Result<&'static str> {
    Ok(provider_id.parse::<AiProviderType>()?.default_api_url())
}
