//! LysAI CLI: the main entry point.
//!
//! Commands:
//! - `run`: Answer one question end to end
//! - `memory`: Inspect and maintain the episodic store
//! - `onboard`: Write a default config file
//! - `config`: Show, validate or locate the configuration

use clap::{Parser, Subcommand};

mod commands;
mod wiring;

#[derive(Parser)]
#[command(
    name = "lysai",
    about = "LysAI: ask questions of your database in plain language",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question about the data
    Run {
        /// The question, in plain language
        question: String,

        /// Override the iteration budget
        #[arg(long)]
        max_steps: Option<u32>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect and maintain episodic memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Write a default configuration file
    Onboard,

    /// Configuration commands (defaults to `show`)
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Keyword and similarity search over past runs
    Search {
        query: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Most recent successful runs
    Recent {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Print one stored episode
    Show { id: i64 },

    /// Rebuild the similarity index from stored successes
    Reindex {
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },

    /// Database and index statistics
    Stats,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Check the configuration for problems
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            question,
            max_steps,
            json,
        } => commands::run::run(&question, max_steps, json).await?,
        Commands::Memory { action } => match action {
            MemoryAction::Search { query, limit } => commands::memory::search(&query, limit).await?,
            MemoryAction::Recent { limit } => commands::memory::recent(limit).await?,
            MemoryAction::Show { id } => commands::memory::show(id).await?,
            MemoryAction::Reindex { limit } => commands::memory::reindex(limit).await?,
            MemoryAction::Stats => commands::memory::stats().await?,
        },
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}
