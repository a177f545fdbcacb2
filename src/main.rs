use anyhow::{Context, Result};
use clap::Parser;
use mcp_llm_bridge::{config, Session};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "mcp-llm-bridge")]
#[command(about = "Chat with an OpenAI-compatible model that can call MCP tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "bridge.toml")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Override log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,

    /// Override the maximum number of tool rounds per message
    #[arg(long)]
    max_tool_rounds: Option<usize>,

    /// Send a single prompt, print the answer and exit
    #[arg(short, long)]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = config::load_config(Some(cli.config.as_path())).with_context(|| {
        format!(
            "Failed to load configuration from: {}",
            cli.config.display()
        )
    })?;

    // Apply CLI overrides
    if let Some(log_level) = cli.log_level {
        config.logging.level = log_level;
    }
    if let Some(log_format) = cli.log_format {
        config.logging.format = log_format;
    }
    if let Some(rounds) = cli.max_tool_rounds {
        config.bridge.max_tool_rounds = rounds;
    }

    init_logging(&config.logging)?;

    print_banner(&config);

    let session = Session::open(&config)
        .await
        .context("Failed to open bridge session")?;

    let result = match cli.prompt {
        Some(prompt) => session
            .process_message(&prompt)
            .await
            .map(|answer| println!("{}", answer))
            .map_err(anyhow::Error::from),
        None => run_interactive(&session).await,
    };

    session.close().await;
    result
}

async fn run_interactive(session: &Session) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nEnter your prompt (or 'quit' to exit): ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, exiting...");
                break;
            }
        };

        // EOF
        let Some(line) = line else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }

        tokio::select! {
            result = session.process_message(input) => match result {
                Ok(answer) => println!("\nResponse: {}", answer),
                Err(e) if e.is_transport_failure() => {
                    error!("Error occurred: {}", e);
                    warn!("The tool server connection may be unusable; restart the bridge if tools keep failing");
                }
                Err(e) => error!("Error occurred: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, exiting...");
                break;
            }
        }
    }

    Ok(())
}

fn init_logging(config: &config::LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // Logs go to stderr so answers on stdout stay clean
    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            // Default to pretty format
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

fn print_banner(config: &config::BridgeConfig) {
    let version = env!("CARGO_PKG_VERSION");

    info!("mcp-llm-bridge v{}", version);
    info!("  → Model: {}", config.model.name);
    info!("  → Endpoint: {}", config.model.base_url);
    info!("  → Tool server: {}", config.server.command_line());
    info!("  → Max tool rounds: {}", config.bridge.max_tool_rounds);
    info!("  → Log Level: {}", config.logging.level);
}
