use super::{CompletionRequest, ModelClient, Outcome};
use crate::bridge::{Message, ToolCallRequest};
use crate::catalog::{FunctionTool, ToolCatalog};
use crate::config::ModelConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Client for OpenAI-compatible `/chat/completions` endpoints (OpenAI, Ollama, vLLM, ...).
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    url: String,
    request_timeout: Duration,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAiClient {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.name.clone(),
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            request_timeout: config.request_timeout(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<ChatResponse> {
        let mut request = self.client.post(&self.url).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::timeout("model completion", self.request_timeout)
            } else {
                BridgeError::ModelEndpoint(format!("request to {} failed: {}", self.url, e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(BridgeError::RateLimited { retry_after });
        }

        let text = response.text().await.map_err(|e| {
            BridgeError::ModelEndpoint(format!("failed to read response body: {}", e))
        })?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BridgeError::ModelEndpoint(format!(
                "authentication rejected ({}): {}",
                status, text
            )));
        }
        if !status.is_success() {
            return Err(BridgeError::ModelEndpoint(format!(
                "unexpected status {}: {}",
                status, text
            )));
        }

        serde_json::from_str(&text).map_err(|e| {
            BridgeError::MalformedOutput(format!("response is not a chat completion: {}", e))
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Outcome> {
        let mut messages = Vec::with_capacity(request.history.len() + 1);
        if let Some(prompt) = request.system_prompt {
            messages.push(WireMessage::text("system", prompt));
        }
        messages.extend(request.history.iter().map(WireMessage::from));

        let body = ChatRequest {
            model: &self.model,
            messages,
            tools: request.catalog.to_function_tools(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            "Chat completion request to {} ({} messages, {} tools)",
            self.url,
            body.messages.len(),
            body.tools.len()
        );

        let response = tokio::time::timeout(self.request_timeout, self.send(&body))
            .await
            .map_err(|_| BridgeError::timeout("model completion", self.request_timeout))??;

        parse_outcome(response, request.catalog)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn parse_outcome(response: ChatResponse, catalog: &ToolCatalog) -> Result<Outcome> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| BridgeError::MalformedOutput("response has no choices".to_string()))?;

    let tool_calls = message.tool_calls.unwrap_or_default();
    if tool_calls.is_empty() {
        return message.content.map(Outcome::FinalAnswer).ok_or_else(|| {
            BridgeError::MalformedOutput("message has neither content nor tool calls".to_string())
        });
    }

    if message.content.as_deref().is_some_and(|c| !c.trim().is_empty()) {
        debug!("Dropping assistant text that accompanied tool calls");
    }

    let calls = tool_calls
        .into_iter()
        .map(|call| {
            let name = call.function.name;
            if !catalog.contains(&name) {
                return Err(BridgeError::MalformedOutput(format!(
                    "model requested unknown tool '{}'",
                    name
                )));
            }
            let arguments = parse_arguments(&name, call.function.arguments)?;
            Ok(ToolCallRequest::new(call.id.unwrap_or_default(), name, arguments))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Outcome::ToolCallBatch(calls))
}

/// Arguments arrive as a JSON-encoded string (OpenAI) or an object (some local servers).
fn parse_arguments(tool: &str, raw: Value) -> Result<Value> {
    let parsed = match raw {
        Value::Null => return Ok(Value::Object(Map::new())),
        Value::String(text) if text.trim().is_empty() => return Ok(Value::Object(Map::new())),
        Value::String(text) => serde_json::from_str(&text).map_err(|e| {
            BridgeError::MalformedOutput(format!("arguments for '{}' are not JSON: {}", tool, e))
        })?,
        other => other,
    };

    match parsed {
        Value::Object(_) => Ok(parsed),
        Value::Null => Ok(Value::Object(Map::new())),
        other => Err(BridgeError::MalformedOutput(format!(
            "arguments for '{}' must be a JSON object, got {}",
            tool, other
        ))),
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        match message {
            Message::System { text } => WireMessage::text("system", text),
            Message::User { text } => WireMessage::text("user", text),
            Message::Assistant { text } => WireMessage::text("assistant", text),
            Message::ToolCalls { calls } => WireMessage {
                role: "assistant",
                content: None,
                tool_calls: calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        call_type: "function",
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
                tool_call_id: None,
            },
            Message::ToolResult(result) => WireMessage {
                role: "tool",
                content: Some(result.content()),
                tool_calls: Vec::new(),
                tool_call_id: Some(result.call_id.clone()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}
