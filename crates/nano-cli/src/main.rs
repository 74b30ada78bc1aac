//! Nano CLI - drive the streaming generation pipeline from a terminal.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Nano - on-device assistant generation pipeline
#[derive(Parser)]
#[command(name = "nano")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a reply from a running llama-server
    Chat {
        /// Prompt to send
        prompt: String,
        /// Server base URL (overrides --port)
        #[arg(long)]
        url: Option<String>,
        /// Server port on localhost
        #[arg(long, default_value_t = nano_engine::DEFAULT_PORT)]
        port: u16,
        /// Model name reported in metrics
        #[arg(long)]
        model: Option<String>,
        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Tool schema (JSON file) to offer the model
        #[arg(long)]
        tools: Option<PathBuf>,
        /// Record the run as a regeneration
        #[arg(long)]
        regenerate: bool,
    },

    /// Split a saved model reply into answer, reasoning and code
    Extract {
        /// File holding the raw model output
        file: PathBuf,
    },

    /// Show the effective configuration
    Info,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    match cli.command {
        Commands::Chat {
            prompt,
            url,
            port,
            model,
            max_tokens,
            tools,
            regenerate,
        } => {
            let options = commands::chat::ChatOptions {
                prompt,
                url,
                port,
                model,
                max_tokens,
                tools,
                regenerate,
            };
            tokio::runtime::Runtime::new()
                .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?
                .block_on(commands::chat::run(options))
        }
        Commands::Extract { file } => commands::extract::run(&file),
        Commands::Info => commands::info::run(),
    }
}
