pub mod types;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use std::path::Path;
pub use types::*;

/// Well-known variables that fill in model settings nobody else provided.
const OPENAI_FALLBACKS: [(&str, &str); 3] = [
    ("OPENAI_API_KEY", "model.api_key"),
    ("OPENAI_MODEL", "model.name"),
    ("OPENAI_BASE_URL", "model.base_url"),
];

/// Load configuration from an optional TOML file layered under `BRIDGE_*`
/// environment variables (`BRIDGE_MODEL__NAME`, `BRIDGE_SERVER__COMMAND`, ...).
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let mut builder = Config::builder();

    for (var, key) in OPENAI_FALLBACKS {
        if let Ok(value) = std::env::var(var) {
            builder = builder
                .set_default(key, value)
                .with_context(|| format!("Invalid value in {}", var))?;
        }
    }

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(false));
    }

    let config = builder
        .add_source(
            Environment::with_prefix("BRIDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to assemble configuration sources")?;

    let bridge_config: BridgeConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    validate_config(&bridge_config)?;

    Ok(bridge_config)
}

/// Validate a configuration before any process is launched
pub fn validate_config(config: &BridgeConfig) -> Result<()> {
    if config.server.command.trim().is_empty() {
        anyhow::bail!("Tool server command must not be empty");
    }

    if config.model.name.trim().is_empty() {
        anyhow::bail!("Model name must not be empty");
    }

    let base_url = &config.model.base_url;
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        anyhow::bail!(
            "Model base URL '{}' must start with http:// or https://",
            base_url
        );
    }

    if config.bridge.max_tool_rounds == 0 {
        anyhow::bail!("max_tool_rounds must be at least 1");
    }

    let timeouts = [
        ("server.handshake_timeout_secs", config.server.handshake_timeout_secs),
        ("server.call_timeout_secs", config.server.call_timeout_secs),
        ("server.shutdown_timeout_secs", config.server.shutdown_timeout_secs),
        ("model.request_timeout_secs", config.model.request_timeout_secs),
    ];
    for (name, secs) in timeouts {
        if secs == 0 {
            anyhow::bail!("{} must be greater than zero", name);
        }
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        anyhow::bail!(
            "Invalid log level '{}'. Valid levels: {}",
            config.logging.level,
            valid_levels.join(", ")
        );
    }

    let valid_formats = ["pretty", "json"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        anyhow::bail!(
            "Invalid log format '{}'. Valid formats: {}",
            config.logging.format,
            valid_formats.join(", ")
        );
    }

    Ok(())
}
