//! Model Action Decoding
//!
//! Turns a provider [`CallResult`] into the action the dispatcher acts on.
//! Decoding is an ordered pipeline:
//! 1. structured result or text that parses as a JSON object
//! 2. a ```json fenced block inside the text
//! 3. catch-all: the raw text wrapped as a `message` action

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::ai::CallResult;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("Invalid fenced json regex"));

/// Kind of action requested by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    RequestFile,
    UpdateFile,
    RunCommand,
    RequestInput,
    IssueResolved,
    Message,
    /// Any token the dispatcher does not know; kept for the error reply
    Unknown(String),
}

impl ActionKind {
    pub fn parse(token: &str) -> Self {
        match token.to_lowercase().as_str() {
            "request_file" => ActionKind::RequestFile,
            "update_file" => ActionKind::UpdateFile,
            "run_command" => ActionKind::RunCommand,
            "request_input" => ActionKind::RequestInput,
            "issue_resolved" => ActionKind::IssueResolved,
            "message" => ActionKind::Message,
            other => ActionKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::RequestFile => "request_file",
            ActionKind::UpdateFile => "update_file",
            ActionKind::RunCommand => "run_command",
            ActionKind::RequestInput => "request_input",
            ActionKind::IssueResolved => "issue_resolved",
            ActionKind::Message => "message",
            ActionKind::Unknown(token) => token,
        }
    }
}

/// Payload after the first decoding stages
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Json(Map<String, Value>),
    Text(String),
}

impl DecodedPayload {
    /// Run the JSON and fenced-block stages over a call result
    pub fn decode(result: &CallResult) -> Self {
        match result {
            CallResult::Structured(Value::Object(map)) => DecodedPayload::Json(map.clone()),
            CallResult::Structured(other) => DecodedPayload::Text(other.to_string()),
            CallResult::Text(text) => decode_text(text),
        }
    }
}

fn decode_text(text: &str) -> DecodedPayload {
    if let Ok(map) = serde_json::from_str::<Map<String, Value>>(text.trim()) {
        return DecodedPayload::Json(map);
    }
    if let Some(inner) = FENCED_JSON.captures(text).and_then(|caps| caps.get(1)) {
        if let Ok(map) = serde_json::from_str::<Map<String, Value>>(inner.as_str()) {
            return DecodedPayload::Json(map);
        }
    }
    DecodedPayload::Text(text.to_string())
}

/// An action issued by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAction {
    pub kind: ActionKind,
    pub details: Map<String, Value>,
    pub message: Option<String>,
}

impl ModelAction {
    pub fn from_call_result(result: &CallResult) -> Self {
        match DecodedPayload::decode(result) {
            DecodedPayload::Json(map) => Self::from_object(map),
            DecodedPayload::Text(text) => Self::plain_message(text),
        }
    }

    fn from_object(map: Map<String, Value>) -> Self {
        let token = match map.get("action").and_then(Value::as_str) {
            Some(token) => token.to_string(),
            None => return Self::plain_message(Value::Object(map).to_string()),
        };

        let details = match map.get("details") {
            Some(Value::Object(details)) => details.clone(),
            _ => Map::new(),
        };
        let message = map.get("message").and_then(Value::as_str).map(str::to_string);

        Self {
            kind: ActionKind::parse(&token),
            details,
            message,
        }
    }

    /// The catch-all variant for output that is not an action object
    pub fn plain_message(text: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Message,
            details: Map::new(),
            message: Some(text.into()),
        }
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }

    /// String entries of an array detail; non-string entries are skipped
    pub fn detail_str_list(&self, key: &str) -> Vec<String> {
        match self.details.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_action() {
        let result = CallResult::Structured(json!({
            "action": "request_file",
            "details": {"file_paths": ["src/main.rs", 3, "Cargo.toml"]},
            "message": "Let me look"
        }));
        let action = ModelAction::from_call_result(&result);
        assert_eq!(action.kind, ActionKind::RequestFile);
        assert_eq!(action.message.as_deref(), Some("Let me look"));
        assert_eq!(action.detail_str_list("file_paths"), vec!["src/main.rs", "Cargo.toml"]);
    }

    #[test]
    fn test_action_token_is_case_insensitive() {
        let result = CallResult::Structured(json!({"action": "RUN_COMMAND", "details": {"command": "ls"}}));
        let action = ModelAction::from_call_result(&result);
        assert_eq!(action.kind, ActionKind::RunCommand);
        assert_eq!(action.detail_str("command"), Some("ls"));
    }

    #[test]
    fn test_text_json_action() {
        let result = CallResult::Text(r#"{"action":"issue_resolved","details":{"solution":"done"}}"#.to_string());
        let action = ModelAction::from_call_result(&result);
        assert_eq!(action.kind, ActionKind::IssueResolved);
        assert_eq!(action.detail_str("solution"), Some("done"));
        assert!(action.message.is_none());
    }

    #[test]
    fn test_fenced_json_action() {
        let text = "Here you go:\n```json\n{\"action\": \"request_input\", \"details\": {\"question\": \"Which OS?\"}}\n```\n";
        let action = ModelAction::from_call_result(&CallResult::Text(text.to_string()));
        assert_eq!(action.kind, ActionKind::RequestInput);
        assert_eq!(action.detail_str("question"), Some("Which OS?"));
    }

    #[test]
    fn test_plain_text_becomes_message() {
        let action = ModelAction::from_call_result(&CallResult::Text("Just chatting".to_string()));
        assert_eq!(action.kind, ActionKind::Message);
        assert_eq!(action.message.as_deref(), Some("Just chatting"));
        assert!(action.details.is_empty());
    }

    #[test]
    fn test_object_without_action_becomes_message() {
        let action = ModelAction::from_call_result(&CallResult::Structured(json!({"foo": 1})));
        assert_eq!(action.kind, ActionKind::Message);
        assert_eq!(action.message.as_deref(), Some(r#"{"foo":1}"#));
    }

    #[test]
    fn test_non_object_json_becomes_message() {
        let action = ModelAction::from_call_result(&CallResult::Text("[1, 2]".to_string()));
        assert_eq!(action.kind, ActionKind::Message);
        assert_eq!(action.message.as_deref(), Some("[1, 2]"));
    }

    #[test]
    fn test_unknown_action_preserved() {
        let action = ModelAction::from_call_result(&CallResult::Structured(json!({"action": "dance"})));
        assert_eq!(action.kind, ActionKind::Unknown("dance".to_string()));
        assert_eq!(action.kind.as_str(), "dance");
    }
}
