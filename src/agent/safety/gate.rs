use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ai::{create_provider, AiProvider, CallResult, InputSpec, InputType, ProviderConfig, ToolSchema};
use crate::models::action::DecodedPayload;
use crate::models::error::Result;
use crate::models::message::Message;

/// Output token limit for one safety evaluation
pub const SAFETY_TOKEN_LIMIT: u32 = 1000;

/// Instructions for the evaluator, scoped to the project directory
pub fn safety_system_prompt(project_dir: &Path) -> String {
    format!(
        "Evaluate the safety of the following shell command in the context of a project located at: {}.\n\
         Ensure the command:\n\
         - Does not perform any destructive actions (e.g., delete system files).\n\
         - Operates strictly within the specified project directory.\n\
         - Is relevant to the problem or context at hand.\n\
         \n\
         Please respond with 1 or 0, and suggest a safer alternative if deemed unsafe, 1 for safe and 0 for unsafe.\n",
        project_dir.display()
    )
}

/// Single `is_ok` verdict field constrained to "1" or "0"
pub fn command_evaluation_schema() -> ToolSchema {
    ToolSchema::new(
        "command_evaluation",
        "Evaluate the safety of shell commands",
        vec![InputSpec::new("is_ok", InputType::String)
            .describe("1 for safe, 0 for unsafe")
            .one_of(["1", "0"])
            .required()],
    )
}

/// Same provider, key and model as the agent; safety prompt and schema instead of the agent's
pub fn safety_config(base: &ProviderConfig, project_dir: &Path) -> ProviderConfig {
    ProviderConfig {
        system_prompt: Some(safety_system_prompt(project_dir)),
        schema: Some(command_evaluation_schema()),
        ..base.clone()
    }
}

/// AI-backed check run before any shell command.
///
/// Every failure mode reads as "unsafe" and leaves the decision to the operator.
pub struct SafetyGate {
    provider: Arc<dyn AiProvider>,
}

impl SafetyGate {
    pub fn new(provider: Arc<dyn AiProvider>) -> Self {
        Self { provider }
    }

    pub fn from_config(base: &ProviderConfig, project_dir: &Path) -> Result<Self> {
        Ok(Self::new(create_provider(&safety_config(base, project_dir))?))
    }

    pub async fn is_safe(&self, command: &str) -> bool {
        debug!("Checking if command is safe: '{}'", command);

        let schema = command_evaluation_schema();
        let conversation = [Message::user(format!("Command: {}", command))];
        let safe = match self
            .provider
            .call(&conversation, Some(&schema), Some(SAFETY_TOKEN_LIMIT))
            .await
        {
            Ok(result) => verdict(&result),
            Err(e) => {
                warn!("Safety evaluation failed for '{}': {}", command, e);
                false
            }
        };

        if safe {
            info!("Command evaluated as safe");
        } else {
            warn!("Command evaluated as potentially unsafe");
        }
        safe
    }
}

/// `is_ok` (or a bare message) must be exactly "1"
fn verdict(result: &CallResult) -> bool {
    match DecodedPayload::decode(result) {
        DecodedPayload::Json(map) => map
            .get("is_ok")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .is_some_and(|value| value.trim() == "1"),
        DecodedPayload::Text(text) => text.trim() == "1",
    }
}
