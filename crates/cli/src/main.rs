//! ragline CLI
//!
//! Main entry point for the ragline command-line tool: ingest local
//! documents into a vector index and ask questions answered from them.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    AskCommand, ChatCommand, ClearCommand, DeleteCommand, IngestCommand, ListCommand,
    SearchCommand, StatsCommand,
};
use ragline_core::{config::AppConfig, logging, AppError, AppResult};
use ragline_knowledge::RagPipeline;
use std::path::PathBuf;
use tracing::Instrument;

/// ragline - retrieval-augmented answers over your documents
#[derive(Parser, Debug)]
#[command(name = "ragline")]
#[command(about = "Retrieval-augmented answers over local documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGLINE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGLINE_CONFIG")]
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

    /// LLM provider (ollama, openai)
    #[arg(short, long, global = true, env = "RAGLINE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "RAGLINE_LLM_MODEL")]
    model: Option<String>,

    /// Collection to operate on
    #[arg(long, global = true, env = "RAGLINE_COLLECTION")]
    collection: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk, embed and index documents
    Ingest(IngestCommand),

    /// Show the chunks retrieved for a query
    Search(SearchCommand),

    /// Answer a question from the indexed documents
    Ask(AskCommand),

    /// Interactive question answering with conversation history
    Chat(ChatCommand),

    /// List indexed chunks
    List(ListCommand),

    /// Delete a source or individual chunks
    Delete(DeleteCommand),

    /// Show collection statistics
    Stats(StatsCommand),

    /// Remove every chunk from the collection
    Clear(ClearCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ingest(_) => "ingest",
            Commands::Search(_) => "search",
            Commands::Ask(_) => "ask",
            Commands::Chat(_) => "chat",
            Commands::List(_) => "list",
            Commands::Delete(_) => "delete",
            Commands::Stats(_) => "stats",
            Commands::Clear(_) => "clear",
        }
    }

    async fn execute(&self, pipeline: &RagPipeline) -> AppResult<()> {
        match self {
            Commands::Ingest(cmd) => cmd.execute(pipeline).await,
            Commands::Search(cmd) => cmd.execute(pipeline).await,
            Commands::Ask(cmd) => cmd.execute(pipeline).await,
            Commands::Chat(cmd) => cmd.execute(pipeline).await,
            Commands::List(cmd) => cmd.execute(pipeline).await,
            Commands::Delete(cmd) => cmd.execute(pipeline).await,
            Commands::Stats(cmd) => cmd.execute(pipeline).await,
            Commands::Clear(cmd) => cmd.execute(pipeline).await,
        }
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load_with(cli.workspace, cli.config)?.with_overrides(
        cli.provider,
        cli.model,
        cli.collection,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("ragline starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!(
        llm = %config.llm.provider,
        model = %config.llm.model,
        embedding = %config.embedding.provider,
        backend = ?config.index.backend,
        "Effective configuration"
    );

    let span = tracing::info_span!("command", name = cli.command.name());
    let result = async {
        let pipeline = RagPipeline::from_config(&config).await?;

        // Dropping the command future cancels it at its next await point
        tokio::select! {
            result = cli.command.execute(&pipeline) => result,
            _ = tokio::signal::ctrl_c() => Err(AppError::Cancelled),
        }
    }
    .instrument(span)
    .await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!(kind = e.kind(), "Command failed: {}", e),
    }

    result
}
