use super::history::{Message, ToolCallRequest, ToolCallResult, ToolOutcome};
use crate::catalog::ToolCatalog;
use crate::config::{validate_config, BridgeConfig, BridgeOptions};
use crate::error::{BridgeError, Result, ToolFailure};
use crate::mcp::{McpTransport, ToolTransport};
use crate::model::{CompletionRequest, ModelClient, OpenAiClient, Outcome};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Live bridge between one tool server and one model endpoint.
///
/// `process_message` must not be called concurrently on the same session;
/// a second caller gets [`BridgeError::SessionBusy`] instead of waiting.
/// [`Session::history`] takes the same lock while it copies the history, so a
/// turn started during that copy is also refused with `SessionBusy`.
/// Call [`Session::close`] when done. Dropping an open session still kills
/// the tool server, but without the graceful shutdown.
pub struct Session {
    transport: Arc<dyn ToolTransport>,
    model: Arc<dyn ModelClient>,
    catalog: ToolCatalog,
    system_prompt: Option<String>,
    max_tool_rounds: usize,
    conversation: Mutex<Conversation>,
    closed: AtomicBool,
}

#[derive(Default)]
struct Conversation {
    history: Vec<Message>,
    call_ids: HashSet<String>,
    next_call_id: u64,
}

impl Conversation {
    /// Give every call an id not yet seen in this session.
    fn assign_call_ids(&mut self, calls: Vec<ToolCallRequest>) -> Vec<ToolCallRequest> {
        calls
            .into_iter()
            .map(|mut call| {
                if call.id.is_empty() || self.call_ids.contains(&call.id) {
                    let generated = self.generate_call_id();
                    debug!("Replacing call id '{}' with '{}'", call.id, generated);
                    call.id = generated;
                }
                self.call_ids.insert(call.id.clone());
                call
            })
            .collect()
    }

    fn generate_call_id(&mut self) -> String {
        loop {
            self.next_call_id += 1;
            let id = format!("call_{}", self.next_call_id);
            if !self.call_ids.contains(&id) {
                return id;
            }
        }
    }

    /// Append a finished round: the request record followed by its results.
    fn commit_round(&mut self, calls: Vec<ToolCallRequest>, results: Vec<ToolCallResult>) {
        self.history.push(Message::ToolCalls { calls });
        self.history
            .extend(results.into_iter().map(Message::ToolResult));
    }
}

impl Session {
    /// Launch the configured tool server and connect it to the model endpoint.
    pub async fn open(config: &BridgeConfig) -> Result<Self> {
        validate_config(config)?;

        let transport = Arc::new(McpTransport::start(&config.server).await?);
        let model = Arc::new(OpenAiClient::new(&config.model));

        Self::with_components(transport, model, config.bridge.clone()).await
    }

    /// Assemble a session from already-started parts. The transport is stopped
    /// if the tool catalog cannot be fetched.
    pub async fn with_components(
        transport: Arc<dyn ToolTransport>,
        model: Arc<dyn ModelClient>,
        options: BridgeOptions,
    ) -> Result<Self> {
        let catalog = match transport.list_tools().await.and_then(ToolCatalog::new) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("Failed to load tool catalog: {}", e);
                transport.stop().await;
                return Err(e);
            }
        };

        info!(
            "Bridge session ready: model {} with {} tools ({})",
            model.model_name(),
            catalog.len(),
            catalog.names().collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            transport,
            model,
            catalog,
            system_prompt: options.system_prompt,
            max_tool_rounds: options.max_tool_rounds,
            conversation: Mutex::new(Conversation::default()),
            closed: AtomicBool::new(false),
        })
    }

    /// Run one user turn to completion and return the model's final answer.
    ///
    /// Tool failures and tool timeouts are shown to the model as tool results
    /// and never abort the turn. A broken tool server connection aborts it
    /// once the round is recorded, returning an error for which
    /// [`BridgeError::is_transport_failure`] holds. Every other error aborts
    /// the turn too; history keeps the user message and all fully completed
    /// tool rounds.
    pub async fn process_message(&self, text: &str) -> Result<String> {
        let mut conversation = self
            .conversation
            .try_lock()
            .map_err(|_| BridgeError::SessionBusy)?;

        if self.is_closed() {
            return Err(BridgeError::SessionClosed);
        }

        conversation.history.push(Message::user(text));
        let mut rounds = 0;

        loop {
            let outcome = self
                .model
                .complete(CompletionRequest {
                    system_prompt: self.system_prompt.as_deref(),
                    history: &conversation.history,
                    catalog: &self.catalog,
                })
                .await?;

            let calls = match outcome {
                Outcome::FinalAnswer(answer) => {
                    conversation.history.push(Message::assistant(answer.clone()));
                    debug!("Final answer after {} tool rounds", rounds);
                    return Ok(answer);
                }
                Outcome::ToolCallBatch(calls) => calls,
            };

            if calls.is_empty() {
                return Err(BridgeError::MalformedOutput(
                    "model returned an empty tool call batch".to_string(),
                ));
            }
            if rounds == self.max_tool_rounds {
                warn!(
                    "Model still requesting tools after {} rounds, giving up",
                    rounds
                );
                return Err(BridgeError::LoopBudgetExceeded { rounds });
            }
            rounds += 1;

            let calls = conversation.assign_call_ids(calls);
            let (results, broken) = self.run_tools(&calls).await;
            conversation.commit_round(calls, results);

            if let Some(e) = broken {
                error!("Tool server connection lost, aborting turn: {}", e);
                return Err(e);
            }
        }
    }

    /// Run a batch in request order. A transport failure stops the batch:
    /// calls after it are recorded as not run and the error is handed back.
    async fn run_tools(
        &self,
        calls: &[ToolCallRequest],
    ) -> (Vec<ToolCallResult>, Option<BridgeError>) {
        let mut results = Vec::with_capacity(calls.len());
        let mut broken: Option<BridgeError> = None;

        for call in calls {
            if broken.is_some() {
                results.push(ToolCallResult {
                    call_id: call.id.clone(),
                    outcome: ToolOutcome::Failure(
                        "not run: tool server connection lost".to_string(),
                    ),
                });
                continue;
            }

            info!("Calling tool '{}' ({})", call.name, call.id);
            debug!("Arguments: {}", call.arguments);

            let outcome = match self.transport.invoke(&call.name, call.arguments.clone()).await {
                Ok(value) => ToolOutcome::Success(value),
                Err(e) => {
                    warn!("Tool '{}' ({}) failed: {}", call.name, call.id, e);
                    let message = failure_message(&e);
                    if e.is_transport_failure() {
                        broken = Some(e);
                    } else if !self.transport.is_running() {
                        broken = Some(BridgeError::ToolInvocation {
                            tool: call.name.clone(),
                            failure: ToolFailure::Transport(
                                "tool server is no longer running".to_string(),
                            ),
                        });
                    }
                    ToolOutcome::Failure(message)
                }
            };

            results.push(ToolCallResult {
                call_id: call.id.clone(),
                outcome,
            });
        }

        (results, broken)
    }

    /// Snapshot of the conversation so far (system prompt excluded).
    pub async fn history(&self) -> Vec<Message> {
        self.conversation.lock().await.history.clone()
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the tool server. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Session already closed");
            return;
        }

        info!("Closing bridge session");
        self.transport.stop().await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.is_closed() {
            warn!("Bridge session dropped without close, tool server will be killed");
        }
    }
}

fn failure_message(err: &BridgeError) -> String {
    match err {
        BridgeError::ToolInvocation {
            failure: ToolFailure::Remote(message),
            ..
        } => message.clone(),
        other => other.to_string(),
    }
}
