//! Tadabbur CLI
//!
//! Main entry point for the tadabbur command-line tool.
//! Searches the Qur'an and hadith corpora and answers questions grounded
//! in them, from the terminal or over HTTP.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{AskCommand, HistoryCommand, IndexCommand, SearchCommand, ServeCommand};
use std::path::PathBuf;
use tadabbur_core::{config::AppConfig, logging};

/// Tadabbur - questions and answers over the Qur'an and hadith
#[derive(Parser, Debug)]
#[command(name = "tadabbur")]
#[command(about = "Semantic search and grounded answers over the Qur'an and hadith", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "TADABBUR_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "TADABBUR_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Generation provider (gemini, ollama)
    #[arg(short, long, global = true, env = "TADABBUR_PROVIDER")]
    provider: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true, env = "TADABBUR_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Semantic search over the corpora
    Search(SearchCommand),

    /// Ask a question answered from the corpora
    Ask(AskCommand),

    /// Load or build both corpus indices
    Index(IndexCommand),

    /// Show a user's past questions
    History(HistoryCommand),

    /// Start the HTTP API
    Serve(ServeCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment and config file
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Apply CLI overrides
    let mut config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    if cli.log_json {
        config.log_json = true;
    }

    config.validate().context("Invalid configuration")?;

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)
        .context("Failed to initialize logging")?;

    tracing::info!("Tadabbur CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    let command_name = match &cli.command {
        Commands::Search(_) => "search",
        Commands::Ask(_) => "ask",
        Commands::Index(_) => "index",
        Commands::History(_) => "history",
        Commands::Serve(_) => "serve",
    };
    let span = tracing::info_span!("command", name = command_name);
    let _guard = span.enter();

    // Route to command handlers
    let result = match cli.command {
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Index(cmd) => cmd.execute(&config).await,
        Commands::History(cmd) => cmd.execute(&config).await,
        Commands::Serve(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {:#}", e),
    }

    result
}
