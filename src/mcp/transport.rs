use super::types::{content_to_text, content_to_value, ToolContent, ToolDefinition};
use crate::config::ServerConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use rmcp::model::{CallToolRequestParams, PaginatedRequestParams, RawContent, ResourceContents};
use rmcp::service::{Peer, RoleClient, RunningService, ServiceError};
use rmcp::transport::TokioChildProcess;
use rmcp::ServiceExt;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Request/response channel to a tool server.
///
/// The bridge is the only writer; implementations may assume calls arrive
/// one at a time but must stay correct if they do not.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Fetch every tool the server advertises.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    /// Invoke one tool and wait for its correlated result.
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<Value>;

    /// Shut the server down. Idempotent, never fails.
    async fn stop(&self);

    fn is_running(&self) -> bool;
}

/// MCP tool server running as a child process, spoken to over stdio.
pub struct McpTransport {
    server_name: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
    running: AtomicBool,
    call_timeout: Duration,
    shutdown_timeout: Duration,
}

impl McpTransport {
    /// Launch the server process and complete the MCP initialize handshake.
    pub async fn start(config: &ServerConfig) -> Result<Self> {
        let server_name = config.command.clone();

        info!("Starting MCP tool server: {}", server_name);
        debug!("Command: {}", config.command_line());

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args).envs(&config.env).kill_on_drop(true);

        let transport = TokioChildProcess::new(cmd).map_err(|e| {
            error!("Failed to spawn tool server: {}", e);
            BridgeError::Startup(format!("{}: {}", server_name, e))
        })?;

        let handshake_timeout = config.handshake_timeout();
        let ct = CancellationToken::new();
        let ct_clone = ct.clone();

        let service = tokio::time::timeout(handshake_timeout, async {
            ().serve_with_ct(transport, ct_clone).await
        })
        .await
        .map_err(|_| {
            ct.cancel();
            BridgeError::Startup(format!(
                "MCP handshake timed out after {:?} for server: {}",
                handshake_timeout, server_name
            ))
        })?
        .map_err(|e| {
            BridgeError::Startup(format!(
                "MCP handshake failed for server {}: {}",
                server_name, e
            ))
        })?;

        info!("MCP tool server ready: {}", server_name);

        Ok(Self {
            server_name,
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            running: AtomicBool::new(true),
            call_timeout: config.call_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    async fn list_page(&self, cursor: Option<String>) -> Result<rmcp::model::ListToolsResult> {
        let request = Some(PaginatedRequestParams { meta: None, cursor });

        tokio::time::timeout(self.call_timeout, self.peer.list_tools(request))
            .await
            .map_err(|_| BridgeError::timeout("tool listing", self.call_timeout))?
            .map_err(|e| {
                error!("Failed to list tools for {}: {}", self.server_name, e);
                BridgeError::Protocol(format!("Failed to list tools: {}", e))
            })
    }
}

#[async_trait]
impl ToolTransport for McpTransport {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        if !self.is_running() {
            return Err(BridgeError::Protocol(format!(
                "tool server {} is not running",
                self.server_name
            )));
        }

        debug!("Listing tools for server: {}", self.server_name);

        let mut tool_list = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let result = self.list_page(cursor.take()).await?;
            tool_list.extend(result.tools.into_iter().map(|t| ToolDefinition {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: Value::Object((*t.input_schema).clone()),
            }));

            cursor = result.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        debug!(
            "Found {} tools for server: {}",
            tool_list.len(),
            self.server_name
        );
        Ok(tool_list)
    }

    async fn invoke(&self, tool: &str, arguments: Value) -> Result<Value> {
        if !self.is_running() {
            return Err(BridgeError::transport_tool(
                tool,
                format!("tool server {} is not running", self.server_name),
            ));
        }

        debug!("Calling tool '{}' on server: {}", tool, self.server_name);

        let request = CallToolRequestParams {
            meta: None,
            name: tool.to_string().into(),
            arguments: arguments.as_object().cloned(),
            task: None,
        };

        let result = tokio::time::timeout(self.call_timeout, self.peer.call_tool(request))
            .await
            .map_err(|_| BridgeError::timeout("tool invocation", self.call_timeout))?
            .map_err(|e| match e {
                ServiceError::McpError(data) => BridgeError::remote_tool(tool, data.message),
                other => {
                    error!(
                        "Failed to call tool '{}' on {}: {}",
                        tool, self.server_name, other
                    );
                    BridgeError::transport_tool(tool, other.to_string())
                }
            })?;

        let content: Vec<ToolContent> = result
            .content
            .into_iter()
            .filter_map(|c| match c.raw {
                RawContent::Text(text_content) => Some(ToolContent::Text {
                    text: text_content.text,
                }),
                RawContent::Image(image_content) => Some(ToolContent::Image {
                    data: image_content.data,
                    mime_type: image_content.mime_type,
                }),
                RawContent::Resource(resource_content) => match resource_content.resource {
                    ResourceContents::TextResourceContents { uri, mime_type, .. } => {
                        Some(ToolContent::Resource { uri, mime_type })
                    }
                    ResourceContents::BlobResourceContents { uri, mime_type, .. } => {
                        Some(ToolContent::Resource { uri, mime_type })
                    }
                },
                _ => None,
            })
            .collect();

        if result.is_error == Some(true) {
            return Err(BridgeError::remote_tool(tool, content_to_text(&content)));
        }

        Ok(content_to_value(content))
    }

    async fn stop(&self) {
        let Some(mut service) = self.service.lock().await.take() else {
            debug!("Tool server {} already stopped", self.server_name);
            return;
        };
        self.running.store(false, Ordering::SeqCst);

        info!("Stopping MCP tool server: {}", self.server_name);

        match tokio::time::timeout(self.shutdown_timeout, service.close()).await {
            Ok(Ok(reason)) => {
                debug!("Tool server {} closed: {:?}", self.server_name, reason);
            }
            Ok(Err(e)) => {
                warn!("Tool server {} closed with error: {}", self.server_name, e);
            }
            Err(_) => {
                warn!(
                    "Tool server {} did not exit within {:?}, killing it",
                    self.server_name, self.shutdown_timeout
                );
            }
        }

        // Dropping the service drops the child handle, which kills the process.
        drop(service);
        info!("Stopped MCP tool server: {}", self.server_name);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for McpTransport {
    fn drop(&mut self) {
        debug!("Dropping McpTransport: {}", self.server_name);
    }
}
