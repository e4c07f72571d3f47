//! OpenAI-compatible chat completions client
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! The credential is fixed at construction.

use super::{
    check_against_schema, Completion, CompletionMode, LlmGateway, LlmMessage, LlmRequest, Role,
    ToolCall, ToolSpec,
};
use crate::config::{Settings, DEFAULT_CHAT_MODEL, DEFAULT_OPENAI_BASE_URL, DEFAULT_TEMPERATURE};
use crate::error::AssistantError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

/// Reusable OpenAI client (connection-pooled)
pub struct OpenAiGateway {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

/// HTTP client shared by every OpenAI caller; clones share one connection pool
pub fn pooled_client() -> Result<Client> {
    Ok(Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .build()?)
}

impl OpenAiGateway {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self::with_client(pooled_client()?, api_key))
    }

    /// Gateway for one credential on an existing client
    pub fn with_client(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn from_settings(settings: &Settings, client: Client, api_key: String) -> Self {
        Self::with_client(client, api_key)
            .with_base_url(settings.openai_base_url.clone())
            .with_model(settings.chat_model.clone())
            .with_temperature(settings.temperature)
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_body(&self, request: &LlmRequest) -> ChatRequest {
        let response_format = match &request.mode {
            CompletionMode::Text => None,
            CompletionMode::Structured(schema) => Some(json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": true,
                }
            })),
        };

        ChatRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: self.temperature,
            response_format,
            tools: request.tools.iter().map(WireTool::from).collect(),
        }
    }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn complete(&self, request: LlmRequest) -> Result<Completion> {
        if self.api_key.is_empty() {
            return Err(AssistantError::Config(
                "OpenAI API key not configured".to_string(),
            ));
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_body(&request);

        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            structured = body.response_format.is_some(),
            "Calling chat completions"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Chat completion request failed: {}", e);
                AssistantError::Llm(format!("chat completion request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Chat completion error response: {} {}", status, error_text);
            return Err(AssistantError::Llm(format!(
                "chat completion API error {}: {}",
                status, error_text
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            AssistantError::Llm(format!("failed to parse chat completion response: {}", e))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AssistantError::Llm("no choices in chat completion".to_string()))?;

        interpret_choice(&request.mode, choice.message)
    }

    fn supports_structured_output(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Map the returned message to a completion honoring the requested mode
fn interpret_choice(mode: &CompletionMode, message: WireResponseMessage) -> Result<Completion> {
    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::String(call.function.arguments)),
            })
            .collect();
        return Ok(Completion::ToolCalls(calls));
    }

    let content = message.content.unwrap_or_default();

    match mode {
        CompletionMode::Text => Ok(Completion::Text(content)),
        CompletionMode::Structured(schema) => {
            let value: Value = serde_json::from_str(content.trim()).map_err(|e| {
                AssistantError::MalformedOutput(format!(
                    "structured completion is not valid JSON: {} | raw={}",
                    e, content
                ))
            })?;
            check_against_schema(&schema.schema, &value)?;
            Ok(Completion::Structured(value))
        }
    }
}

// ================= Wire format =================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&LlmMessage> for WireMessage {
    fn from(msg: &LlmMessage) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let tool_calls: Vec<WireToolCall> = msg
            .tool_calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                kind: "function".to_string(),
                function: WireFunctionCall {
                    name: call.name.clone(),
                    arguments: match &call.arguments {
                        Value::String(raw) => raw.clone(),
                        other => other.to_string(),
                    },
                },
            })
            .collect();

        // Assistant turns that only carry tool calls send a null content
        let content = if msg.content.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(msg.content.clone())
        };

        Self {
            role,
            content,
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}
