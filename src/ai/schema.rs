//! Tool Schema Translation
//!
//! A provider-agnostic description of the single tool the model is forced to
//! call, and its lowering into each provider's native format.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::settings::AiProviderType;
use crate::models::error::{AgentError, Result};

/// Value type of one tool input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    String,
    Number,
    Object,
    Array,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::String => "string",
            InputType::Number => "number",
            InputType::Object => "object",
            InputType::Array => "array",
        }
    }
}

/// One input of a tool; objects and arrays nest further specs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<InputSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Box<InputSpec>>,
}

impl InputSpec {
    pub fn new(name: impl Into<String>, kind: InputType) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            required: false,
            enum_values: None,
            properties: None,
            item: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_properties(mut self, properties: Vec<InputSpec>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_item(mut self, item: InputSpec) -> Self {
        self.item = Some(Box::new(item));
        self
    }

    fn has_enum(&self) -> bool {
        self.enum_values.as_ref().is_some_and(|values| !values.is_empty())
    }

    fn validate(&self, path: &str) -> Result<()> {
        let invalid = |reason: &str| Err(AgentError::SchemaValidation(format!("{}: {}", path, reason)));

        match self.kind {
            InputType::String | InputType::Number => {
                if self.properties.is_some() {
                    return invalid("only object inputs may declare properties");
                }
                if self.item.is_some() {
                    return invalid("only array inputs may declare an item");
                }
            }
            InputType::Object => {
                if self.has_enum() {
                    return invalid("object inputs cannot declare an enum");
                }
                if self.item.is_some() {
                    return invalid("only array inputs may declare an item");
                }
                let properties = match self.properties.as_deref() {
                    Some(properties) if !properties.is_empty() => properties,
                    _ => return invalid("object inputs need at least one property"),
                };
                validate_named(properties, path)?;
            }
            InputType::Array => {
                if self.has_enum() {
                    return invalid("array inputs cannot declare an enum");
                }
                if self.properties.is_some() {
                    return invalid("only object inputs may declare properties");
                }
                match self.item.as_deref() {
                    Some(item) => item.validate(&format!("{}[]", path))?,
                    None => return invalid("array inputs need an item"),
                }
            }
        }
        Ok(())
    }
}

fn validate_named(inputs: &[InputSpec], parent: &str) -> Result<()> {
    for input in inputs {
        if input.name.trim().is_empty() {
            return Err(AgentError::SchemaValidation(format!(
                "{}: every property needs a name",
                parent
            )));
        }
        input.validate(&format!("{}.{}", parent, input.name))?;
    }
    Ok(())
}

/// A callable tool: a name plus its top-level inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub inputs: Vec<InputSpec>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, inputs: Vec<InputSpec>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            inputs,
        }
    }

    /// Parse and validate a schema document
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let schema: ToolSchema = serde_json::from_str(raw)
            .map_err(|e| AgentError::SchemaValidation(format!("invalid schema document: {}", e)))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AgentError::SchemaValidation("tool name is empty".to_string()));
        }
        validate_named(&self.inputs, &self.name)
    }
}

/// Native schema dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFamily {
    /// Lower-case JSON-Schema types (OpenAI, DeepSeek, Anthropic)
    FunctionCalling,
    /// Upper-case types and enum members (Gemini)
    Gemini,
}

impl SchemaFamily {
    pub fn for_provider(provider: AiProviderType) -> Self {
        match provider {
            AiProviderType::Gemini => SchemaFamily::Gemini,
            AiProviderType::Anthropic | AiProviderType::OpenAi | AiProviderType::DeepSeek => {
                SchemaFamily::FunctionCalling
            }
        }
    }

    fn type_name(&self, kind: InputType) -> String {
        match self {
            SchemaFamily::FunctionCalling => kind.as_str().to_string(),
            SchemaFamily::Gemini => kind.as_str().to_uppercase(),
        }
    }

    fn enum_member(&self, value: &str) -> String {
        match self {
            SchemaFamily::FunctionCalling => value.to_string(),
            SchemaFamily::Gemini => value.to_uppercase(),
        }
    }
}

/// Lower a tool schema into the provider's native tool definition
pub fn to_provider_schema(schema: &ToolSchema, provider: AiProviderType) -> Result<Value> {
    schema.validate()?;
    let family = SchemaFamily::for_provider(provider);
    let parameters = lower_object(&schema.inputs, family);

    Ok(match provider {
        AiProviderType::Anthropic => json!({
            "name": schema.name,
            "description": schema.description,
            "input_schema": parameters,
        }),
        AiProviderType::OpenAi | AiProviderType::DeepSeek => json!({
            "type": "function",
            "function": {
                "name": schema.name,
                "description": schema.description,
                "parameters": parameters,
            }
        }),
        AiProviderType::Gemini => parameters,
    })
}

fn lower_object(inputs: &[InputSpec], family: SchemaFamily) -> Value {
    let mut object = Map::new();
    object.insert("type".to_string(), Value::String(family.type_name(InputType::Object)));
    insert_properties(&mut object, inputs, family);
    Value::Object(object)
}

fn insert_properties(object: &mut Map<String, Value>, inputs: &[InputSpec], family: SchemaFamily) {
    let properties: Map<String, Value> = inputs
        .iter()
        .map(|input| (input.name.clone(), lower_input(input, family)))
        .collect();
    object.insert("properties".to_string(), Value::Object(properties));

    // Omitted entirely when nothing is required; never an empty list
    let required: Vec<Value> = inputs
        .iter()
        .filter(|input| input.required)
        .map(|input| Value::String(input.name.clone()))
        .collect();
    if !required.is_empty() {
        object.insert("required".to_string(), Value::Array(required));
    }
}

fn lower_input(input: &InputSpec, family: SchemaFamily) -> Value {
    let mut lowered = Map::new();
    lowered.insert("type".to_string(), Value::String(family.type_name(input.kind)));
    if let Some(description) = &input.description {
        lowered.insert("description".to_string(), Value::String(description.clone()));
    }

    match input.kind {
        InputType::String | InputType::Number => {
            if let Some(values) = input.enum_values.as_ref().filter(|values| !values.is_empty()) {
                let members = values
                    .iter()
                    .map(|value| Value::String(family.enum_member(value)))
                    .collect();
                lowered.insert("enum".to_string(), Value::Array(members));
            }
        }
        InputType::Object => {
            insert_properties(&mut lowered, input.properties.as_deref().unwrap_or_default(), family);
        }
        InputType::Array => {
            if let Some(item) = &input.item {
                lowered.insert("items".to_string(), lower_input(item, family));
            }
        }
    }

    Value::Object(lowered)
}
