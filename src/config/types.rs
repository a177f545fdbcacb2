use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that can use tools to help answer questions.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub bridge: BridgeOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How to launch the MCP tool server subprocess.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub handshake_timeout_secs: u64,
    pub call_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Command line as it would be typed in a shell, for logging.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "uvx".to_string(),
            args: vec![
                "mcp-server-sqlite".to_string(),
                "--db-path".to_string(),
                "test.db".to_string(),
            ],
            env: HashMap::new(),
            handshake_timeout_secs: 30,
            call_timeout_secs: 60,
            shutdown_timeout_secs: 5,
        }
    }
}

/// Chat-completion endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub name: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            name: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            request_timeout_secs: 120,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Conversation behaviour of a bridge session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    pub system_prompt: Option<String>,
    pub max_tool_rounds: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tool_rounds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
