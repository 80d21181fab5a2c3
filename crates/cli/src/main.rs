//! Sleuth CLI: the main entry point.
//!
//! Commands:
//! - `serve`: Start the HTTP streaming gateway
//! - `chat`: Run one turn locally and print its events
//! - `history`: Show a persisted conversation
//! - `config`: Print the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "sleuth",
    about = "Sleuth: a conversational search agent server",
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
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message to the agent and print each stream event as JSON
    Chat {
        /// The message to send
        message: String,

        /// Continue an existing conversation
        #[arg(short, long)]
        checkpoint: Option<String>,
    },

    /// Print a persisted conversation, or list recent ones
    History {
        /// Checkpoint id to show
        id: Option<String>,

        /// How many recent conversations to list
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Print the effective configuration (secrets omitted)
    Config {
        /// Print the config file location instead
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    // Logs go to stderr so `chat` output stays machine-readable.
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
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat {
            message,
            checkpoint,
        } => commands::chat::run(message, checkpoint).await?,
        Commands::History { id, limit } => commands::history::run(id, limit).await?,
        Commands::Config { path } => commands::config_cmd::run(path)?,
    }

    Ok(())
}
