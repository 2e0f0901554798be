//! termhub
//!
//! MCP server exposing PTY-backed shell and ssh sessions as tools.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use termhub::config::{default_config_path, Config};
use termhub::handlers::SessionTools;
use termhub::logging::init_logging;
use termhub::protocol::LineCodec;
use termhub::router::McpRouter;
use termhub::server::{McpConnection, McpSocketServer};
use termhub::session::SessionManager;

/// termhub - interactive shell and ssh sessions over MCP.
#[derive(Parser, Debug)]
#[command(name = "termhub")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve MCP over stdin/stdout
    Serve,

    /// Serve MCP on a Unix domain socket
    Listen {
        /// Socket path to bind
        #[arg(long, short, value_name = "PATH")]
        socket: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let overrides = config.apply_env_overrides();

    let command = cli.command.unwrap_or(Commands::Serve);

    if let Commands::Config { default } = command {
        let shown = if default { Config::default() } else { config };
        print!("{}", shown.to_toml()?);
        return Ok(());
    }

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    let _log_guard = init_logging(
        &config.daemon.log_level,
        cli.verbose,
        config.daemon.log_file.as_deref(),
    )?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "termhub starting"
    );
    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
    }
    if !overrides.is_empty() {
        tracing::info!(variables = ?overrides, "Applied environment overrides");
    }

    let codec = LineCodec::with_max_line_length(config.daemon.max_line_bytes);

    let manager = Arc::new(SessionManager::from_config(&config));
    let tools = SessionTools::from_config(Arc::clone(&manager), &config.session);
    let router = Arc::new(McpRouter::new(tools));

    let result = match command {
        Commands::Listen { socket } => run_socket(&socket, router, codec).await,
        _ => run_stdio(router, codec).await,
    };

    manager.shutdown().await;
    tracing::info!("termhub stopped");

    result
}

/// Serve on stdio until the client closes stdin or Ctrl-C.
async fn run_stdio(router: Arc<McpRouter>, codec: LineCodec) -> anyhow::Result<()> {
    tracing::info!("Serving MCP on stdio");

    tokio::select! {
        result = McpConnection::stdio().with_codec(codec).serve(router) => {
            result.context("stdio transport failed")?;
            tracing::info!("stdin closed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

/// Serve on a Unix socket until Ctrl-C.
async fn run_socket(
    path: &std::path::Path,
    router: Arc<McpRouter>,
    codec: LineCodec,
) -> anyhow::Result<()> {
    let server = McpSocketServer::bind(path)
        .await
        .with_context(|| format!("Failed to bind {}", path.display()))?
        .with_codec(codec);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        signal.cancel();
    });

    server.run(router, shutdown).await?;
    Ok(())
}
