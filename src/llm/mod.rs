//! LLM gateway abstraction
//!
//! Callers pick the completion mode up front: plain text, or a structured
//! object constrained by a JSON schema. Tool specs may be attached to a
//! request; the gateway then either answers or asks for tool calls.

use crate::error::AssistantError;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod openai;

pub use openai::{pooled_client, OpenAiGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant turn that requested tool calls
    pub fn tool_request(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Result of a tool call, answered back to the model
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Tool advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CompletionMode {
    #[default]
    Text,
    Structured(OutputSchema),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LlmRequest {
    pub messages: Vec<LlmMessage>,
    pub mode: CompletionMode,
    pub tools: Vec<ToolSpec>,
}

impl LlmRequest {
    pub fn text(messages: Vec<LlmMessage>) -> Self {
        Self {
            messages,
            mode: CompletionMode::Text,
            tools: Vec::new(),
        }
    }

    pub fn structured(messages: Vec<LlmMessage>, schema: OutputSchema) -> Self {
        Self {
            messages,
            mode: CompletionMode::Structured(schema),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    Structured(Value),
    ToolCalls(Vec<ToolCall>),
}

impl Completion {
    pub fn into_text(self) -> Result<String> {
        match self {
            Completion::Text(text) => Ok(text),
            Completion::Structured(value) => Err(AssistantError::MalformedOutput(format!(
                "expected text completion, got structured object: {}",
                value
            ))),
            Completion::ToolCalls(calls) => Err(AssistantError::MalformedOutput(format!(
                "expected text completion, got {} tool call(s)",
                calls.len()
            ))),
        }
    }

    pub fn into_structured(self) -> Result<Value> {
        match self {
            Completion::Structured(value) => Ok(value),
            Completion::Text(text) => Err(AssistantError::MalformedOutput(format!(
                "expected structured completion, got text: {}",
                text
            ))),
            Completion::ToolCalls(calls) => Err(AssistantError::MalformedOutput(format!(
                "expected structured completion, got {} tool call(s)",
                calls.len()
            ))),
        }
    }
}

#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<Completion>;

    /// Whether `CompletionMode::Structured` is honored by this gateway
    fn supports_structured_output(&self) -> bool;

    fn model_name(&self) -> &str;
}

/// Check an object against the `required` and primitive `type` constraints of a schema
pub fn check_against_schema(schema: &Value, value: &Value) -> Result<()> {
    let object = value.as_object().ok_or_else(|| {
        AssistantError::MalformedOutput(format!("expected a JSON object, got: {}", value))
    })?;

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();

    for key in required {
        if !object.contains_key(key) {
            return Err(AssistantError::MalformedOutput(format!(
                "missing required field '{}'",
                key
            )));
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (key, property) in properties {
        let (Some(field), Some(expected)) = (
            object.get(key),
            property.get("type").and_then(Value::as_str),
        ) else {
            continue;
        };

        let matches = match expected {
            "boolean" => field.is_boolean(),
            "string" => field.is_string(),
            "number" => field.is_number(),
            "integer" => field.is_i64() || field.is_u64(),
            "object" => field.is_object(),
            "array" => field.is_array(),
            _ => true,
        };

        if !matches {
            return Err(AssistantError::MalformedOutput(format!(
                "field '{}' should be of type {}, got: {}",
                key, expected, field
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "need_rag": { "type": "boolean" },
                "rag_query": { "type": "string" }
            },
            "required": ["need_rag", "rag_query"]
        })
    }

    #[test]
    fn test_schema_check_accepts_conforming_object() {
        let value = json!({ "need_rag": true, "rag_query": "turtle traders" });
        assert!(check_against_schema(&schema(), &value).is_ok());
    }

    #[test]
    fn test_schema_check_rejects_missing_and_mistyped_fields() {
        let missing = json!({ "need_rag": true });
        assert!(matches!(
            check_against_schema(&schema(), &missing),
            Err(AssistantError::MalformedOutput(_))
        ));

        let mistyped = json!({ "need_rag": "yes", "rag_query": "" });
        assert!(matches!(
            check_against_schema(&schema(), &mistyped),
            Err(AssistantError::MalformedOutput(_))
        ));

        let not_object = json!(["need_rag"]);
        assert!(check_against_schema(&schema(), &not_object).is_err());
    }

    #[test]
    fn test_completion_conversions() {
        assert_eq!(
            Completion::Text("hi".into()).into_text().unwrap(),
            "hi".to_string()
        );
        assert!(Completion::Text("hi".into()).into_structured().is_err());
        assert!(Completion::ToolCalls(vec![]).into_text().is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
    }
}
