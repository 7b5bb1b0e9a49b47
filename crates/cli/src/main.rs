//! Turnstone CLI — the main entry point.
//!
//! Commands:
//! - `init`   — Write a default config file
//! - `chat`   — Interactive session or single-message mode
//! - `status` — Show configuration and provider health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "turnstone",
    about = "Turnstone — turn-based LLM agent orchestration",
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
    /// Write a default configuration file
    Init,

    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Reuse a session id (defaults to a fresh session)
        #[arg(short, long)]
        session: Option<String>,

        /// Print the machine-readable turn trace as JSON after each turn
        #[arg(long)]
        trace_json: bool,
    },

    /// Show configuration and provider health
    Status,
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
        .init();

    match cli.command {
        Commands::Init => commands::init::run()?,
        Commands::Chat {
            message,
            session,
            trace_json,
        } => commands::chat::run(message, session, trace_json).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
