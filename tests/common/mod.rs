#![allow(dead_code)]

use async_trait::async_trait;
use mcp_llm_bridge::bridge::{Message, ToolCallRequest, ToolOutcome};
use mcp_llm_bridge::config::BridgeOptions;
use mcp_llm_bridge::mcp::{ToolDefinition, ToolTransport};
use mcp_llm_bridge::model::{CompletionRequest, ModelClient, Outcome};
use mcp_llm_bridge::{BridgeError, Result, Session};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ──────────────────────────────────────────────
// Tool server stand-in
// ──────────────────────────────────────────────

type ToolHandler = Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// In-memory tool server: canned handlers per tool, records every call.
pub struct StubTransport {
    tools: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
    fail_listing: bool,
    hang_on: Option<String>,
    pub invocations: Mutex<Vec<(String, Value)>>,
    pub stops: AtomicUsize,
}

impl StubTransport {
    /// SQLite-like tool set with no handlers attached yet.
    pub fn sqlite() -> Self {
        Self {
            tools: vec![
                ToolDefinition::new(
                    "list_tables",
                    Some("List all tables in the SQLite database"),
                    json!({ "type": "object", "properties": {} }),
                ),
                ToolDefinition::new(
                    "read_query",
                    Some("Execute a SELECT query on the SQLite database"),
                    json!({
                        "type": "object",
                        "properties": { "query": { "type": "string" } },
                        "required": ["query"]
                    }),
                ),
            ],
            handlers: HashMap::new(),
            fail_listing: false,
            hang_on: None,
            invocations: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn returning(mut self, tool: &str, value: Value) -> Self {
        self.handlers
            .insert(tool.to_string(), Box::new(move |_| Ok(value.clone())));
        self
    }

    pub fn failing(mut self, tool: &str, message: &str) -> Self {
        let name = tool.to_string();
        let message = message.to_string();
        self.handlers.insert(
            tool.to_string(),
            Box::new(move |_| {
                Err(BridgeError::ToolInvocation {
                    tool: name.clone(),
                    failure: mcp_llm_bridge::ToolFailure::Remote(message.clone()),
                })
            }),
        );
        self
    }

    /// The connection to the server breaks when `tool` is called.
    pub fn broken(mut self, tool: &str) -> Self {
        let name = tool.to_string();
        self.handlers.insert(
            tool.to_string(),
            Box::new(move |_| {
                Err(BridgeError::ToolInvocation {
                    tool: name.clone(),
                    failure: mcp_llm_bridge::ToolFailure::Transport(
                        "connection closed".to_string(),
                    ),
                })
            }),
        );
        self
    }

    /// Calls to `tool` never return.
    pub fn hanging(mut self, tool: &str) -> Self {
        self.hang_on = Some(tool.to_string());
        self
    }

    pub fn with_handler(
        mut self,
        tool: &str,
        handler: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(tool.to_string(), Box::new(handler));
        self
    }

    pub fn with_failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn invoked_tools(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolTransport for StubTransport {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        if self.fail_listing {
            return Err(BridgeError::Protocol("malformed tools/list response".into()));
        }
        Ok(self.tools.clone())
    }

    async fn invoke(&self, tool: &str, arguments: Value) -> Result<Value> {
        self.invocations
            .lock()
            .unwrap()
            .push((tool.to_string(), arguments.clone()));

        if self.hang_on.as_deref() == Some(tool) {
            std::future::pending::<()>().await;
        }

        match self.handlers.get(tool) {
            Some(handler) => handler(&arguments),
            None => Ok(Value::Null),
        }
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.stops.load(Ordering::SeqCst) == 0
    }
}

// ──────────────────────────────────────────────
// Model stand-ins
// ──────────────────────────────────────────────

type Responder = Box<dyn Fn(&CompletionRequest<'_>) -> Result<Outcome> + Send + Sync>;

/// Model whose next step is computed from the request it receives.
pub struct FnModel {
    respond: Responder,
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl FnModel {
    pub fn new(
        respond: impl Fn(&CompletionRequest<'_>) -> Result<Outcome> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Model that answers every prompt with the same text.
    pub fn answering(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(Outcome::FinalAnswer(text.clone())))
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for FnModel {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Outcome> {
        self.requests.lock().unwrap().push(request.history.to_vec());
        (self.respond)(&request)
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }
}

/// Model that parks inside `complete` until released.
pub struct GatedModel {
    pub entered: Notify,
    pub release: Notify,
}

impl GatedModel {
    pub fn new() -> Self {
        Self {
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl ModelClient for GatedModel {
    async fn complete(&self, _request: CompletionRequest<'_>) -> Result<Outcome> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Outcome::FinalAnswer("released".to_string()))
    }

    fn model_name(&self) -> &str {
        "gated-model"
    }
}

// ──────────────────────────────────────────────
// Shared helpers
// ──────────────────────────────────────────────

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, arguments)
}

/// The last message handed to the model, if it is a tool result.
pub fn last_tool_outcome(request: &CompletionRequest<'_>) -> Option<ToolOutcome> {
    match request.history.last() {
        Some(Message::ToolResult(result)) => Some(result.outcome.clone()),
        _ => None,
    }
}

pub async fn open_session(
    transport: Arc<StubTransport>,
    model: Arc<dyn ModelClient>,
    max_tool_rounds: usize,
) -> Session {
    Session::with_components(
        transport,
        model,
        BridgeOptions {
            system_prompt: Some("You are a helpful assistant.".to_string()),
            max_tool_rounds,
        },
    )
    .await
    .unwrap()
}

/// Every tool result must answer the request record before it, in order.
pub fn assert_results_follow_requests(history: &[Message]) {
    let mut pending: Vec<String> = Vec::new();

    for message in history {
        match message {
            Message::ToolCalls { calls } => {
                assert!(pending.is_empty(), "new request while results outstanding");
                pending = calls.iter().map(|c| c.id.clone()).collect();
            }
            Message::ToolResult(result) => {
                assert!(!pending.is_empty(), "tool result without a request");
                let expected = pending.remove(0);
                assert_eq!(result.call_id, expected);
            }
            _ => assert!(pending.is_empty(), "results missing before next message"),
        }
    }

    assert!(pending.is_empty(), "history ends with unanswered tool calls");
}
