//! Application Configuration
//!
//! Settings come from environment variables. Lookups go through a closure so
//! the whole layer can be exercised without touching the process environment.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::ai::{AiProviderType, ProviderConfig, ToolSchema};
use crate::models::error::{AgentError, Result};

/// Use cases with a dedicated system prompt under `prompts/system/`
pub const BUILTIN_USE_CASES: [&str; 6] = [
    "debugging",
    "feature",
    "refactoring",
    "performance",
    "explanation",
    "security",
];

const DEFAULT_PROVIDER: &str = "anthropic";

/// Per-provider overrides read from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub token_limit: Option<u32>,
    /// Provider-only knobs, forwarded as `ProviderConfig::provider_specific`
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debugger_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub system_prompt_path: PathBuf,
    pub response_schema_path: PathBuf,
    /// Selected provider id, as given
    pub provider: String,
    providers: HashMap<AiProviderType, ProviderSettings>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), dirs::home_dir())
    }

    /// Build from `lookup`; `home` anchors the default `~/debugger` directory
    pub fn from_lookup<F>(lookup: F, home: Option<PathBuf>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let debugger_dir = get("DEBUGGER_DIR").map(PathBuf::from).unwrap_or_else(|| {
            home.unwrap_or_else(|| PathBuf::from("."))
                .join("debugger")
        });
        let system_prompt_path = get("DEBUGGER_SYSTEM_PROMPT")
            .map(PathBuf::from)
            .unwrap_or_else(|| debugger_dir.join("system_prompt.md"));
        let response_schema_path = get("DEBUGGER_RESPONSE_SCHEMA")
            .map(PathBuf::from)
            .unwrap_or_else(|| debugger_dir.join("general_schema.json"));

        let mut providers = HashMap::new();
        for provider in AiProviderType::ALL {
            let prefix = provider.as_str().to_uppercase();
            let token_limit = get(&format!("{}_TOKEN_LIMIT", prefix)).and_then(|raw| {
                match raw.parse::<u32>() {
                    Ok(limit) if limit > 0 => Some(limit),
                    _ => {
                        warn!("Ignoring invalid {}_TOKEN_LIMIT '{}'", prefix, raw);
                        None
                    }
                }
            });

            let mut extra = HashMap::new();
            let extra_keys: &[(&str, &str)] = match provider {
                AiProviderType::Anthropic => {
                    &[("version", "ANTHROPIC_VERSION"), ("beta", "ANTHROPIC_BETA")]
                }
                AiProviderType::OpenAi => &[
                    ("org_id", "OPENAI_ORG_ID"),
                    ("reasoning_effort", "OPENAI_REASONING_EFFORT"),
                ],
                AiProviderType::Gemini | AiProviderType::DeepSeek => &[],
            };
            for (name, key) in extra_keys {
                if let Some(value) = get(key) {
                    extra.insert(name.to_string(), value);
                }
            }

            providers.insert(
                provider,
                ProviderSettings {
                    api_key: get(&format!("{}_API_KEY", prefix)),
                    model: get(&format!("{}_MODEL", prefix)),
                    token_limit,
                    extra,
                },
            );
        }

        Self {
            logs_dir: debugger_dir.join("logs"),
            prompts_dir: debugger_dir.join("prompts"),
            debugger_dir,
            system_prompt_path,
            response_schema_path,
            provider: get("DEBUGGER_AI_PROVIDER")
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            providers,
        }
    }

    pub fn provider_type(&self) -> Result<AiProviderType> {
        self.provider.parse()
    }

    pub fn settings(&self, provider: AiProviderType) -> ProviderSettings {
        self.providers.get(&provider).cloned().unwrap_or_default()
    }

    /// Configured key, or the placeholder that `validate` flags
    pub fn api_key(&self, provider: AiProviderType) -> String {
        self.settings(provider)
            .api_key
            .unwrap_or_else(|| placeholder_key(provider))
    }

    pub fn provider_config(
        &self,
        provider_id: &str,
        system_prompt: Option<String>,
        schema: Option<ToolSchema>,
    ) -> Result<ProviderConfig> {
        let provider: AiProviderType = provider_id.parse()?;
        let settings = self.settings(provider);

        Ok(ProviderConfig {
            provider_id: provider.as_str().to_string(),
            api_key: self.api_key(provider),
            model: settings.model,
            max_tokens: settings.token_limit,
            api_url: None,
            system_prompt,
            schema,
            provider_specific: settings.extra,
        })
    }

    /// Human-readable problems; empty when the configuration is usable
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.system_prompt_path.exists() {
            errors.push(format!(
                "System prompt file not found: {}",
                self.system_prompt_path.display()
            ));
        }
        if !self.response_schema_path.exists() {
            errors.push(format!(
                "Response schema file not found: {}",
                self.response_schema_path.display()
            ));
        }

        match self.provider_type() {
            Ok(provider) => {
                let key = self.api_key(provider);
                if key.is_empty() || key == placeholder_key(provider) {
                    errors.push(format!("{} API key looks invalid", display_name(provider)));
                }
            }
            Err(e) => errors.push(e.to_string()),
        }

        errors
    }

    /// Create the logs and prompts directories
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.logs_dir)?;
        fs::create_dir_all(&self.prompts_dir)?;
        Ok(())
    }

    fn use_case_prompt_path(&self, use_case: &str) -> PathBuf {
        let name = if BUILTIN_USE_CASES.contains(&use_case) {
            use_case
        } else {
            "general"
        };
        self.prompts_dir
            .join("system")
            .join(format!("{}_system_prompt.md", name))
    }

    /// Specialized prompt for the use case when one exists, the default
    /// system prompt otherwise
    pub fn system_prompt_for(&self, use_case: &str) -> Result<String> {
        let specialized = self.use_case_prompt_path(use_case);
        if specialized.exists() {
            debug!("Using specialized system prompt for {}", use_case);
            return read_config_file(&specialized, "system prompt");
        }

        warn!("Specialized system prompt not found, using default");
        read_config_file(&self.system_prompt_path, "system prompt")
    }

    /// Response schema, validated before any provider sees it
    pub fn load_schema(&self) -> Result<ToolSchema> {
        let raw = read_config_file(&self.response_schema_path, "response schema")?;
        ToolSchema::from_json_str(&raw)
    }

    /// Summary for `--show-config`
    pub fn display(&self) -> String {
        let provider = self.provider_type().ok();
        let settings = provider.map(|p| self.settings(p)).unwrap_or_default();

        let mut out = String::from("Current Configuration:\n---------------------\n");
        out.push_str(&format!("AI Provider: {}\n", self.provider));
        out.push_str(&format!(
            "Model: {}\n",
            settings.model.as_deref().unwrap_or("default")
        ));
        out.push_str(&format!(
            "Token Limit: {}\n",
            settings
                .token_limit
                .map(|limit| limit.to_string())
                .unwrap_or_else(|| "default".to_string())
        ));
        out.push_str(&format!("System Prompt: {}\n", self.system_prompt_path.display()));
        out.push_str(&format!("Response Schema: {}\n", self.response_schema_path.display()));
        out.push_str(&format!("Log Directory: {}\n", self.logs_dir.display()));
        out
    }
}

fn placeholder_key(provider: AiProviderType) -> String {
    format!("your_{}_api_key_here", provider.as_str())
}

fn display_name(provider: AiProviderType) -> &'static str {
    match provider {
        AiProviderType::Anthropic => "Anthropic",
        AiProviderType::OpenAi => "OpenAI",
        AiProviderType::Gemini => "Gemini",
        AiProviderType::DeepSeek => "DeepSeek",
    }
}

fn read_config_file(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| AgentError::Config(format!("cannot read {} {}: {}", what, path.display(), e)))
}
