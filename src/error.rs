use std::time::Duration;
use thiserror::Error;

/// Why a tool invocation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolFailure {
    /// The tool server ran the request and reported an error.
    #[error("tool reported an error: {0}")]
    Remote(String),

    /// The request never produced a tool-level answer (channel closed, bad frame, ...).
    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start tool server: {0}")]
    Startup(String),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("Tool '{tool}' failed: {failure}")]
    ToolInvocation { tool: String, failure: ToolFailure },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Model endpoint error: {0}")]
    ModelEndpoint(String),

    #[error("Model endpoint rate limited the request{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Tool-call budget of {rounds} rounds exceeded without a final answer")]
    LoopBudgetExceeded { rounds: usize },

    #[error("Session is already processing a message")]
    SessionBusy,

    #[error("Session is closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, BridgeError>;

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(after) => format!(" (retry after {}s)", after.as_secs()),
        None => String::new(),
    }
}

impl BridgeError {
    pub(crate) fn remote_tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::ToolInvocation {
            tool: tool.into(),
            failure: ToolFailure::Remote(message.into()),
        }
    }

    pub(crate) fn transport_tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::ToolInvocation {
            tool: tool.into(),
            failure: ToolFailure::Transport(message.into()),
        }
    }

    pub(crate) fn timeout(operation: &'static str, after: Duration) -> Self {
        BridgeError::Timeout { operation, after }
    }

    /// True when the error came from the subprocess channel rather than the
    /// model or the conversation. Callers should reopen the session.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::Startup(_)
                | BridgeError::Protocol(_)
                | BridgeError::SessionClosed
                | BridgeError::ToolInvocation {
                    failure: ToolFailure::Transport(_),
                    ..
                }
        )
    }
}

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}
