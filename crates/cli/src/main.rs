//! LakeClaw CLI: the main entry point.
//!
//! Commands:
//! - `init`    : Write a default config file
//! - `serve`   : Start the HTTP gateway
//! - `chat`    : Interactive or single-message conversation
//! - `call`    : Invoke one action directly
//! - `actions` : List actions or print their tool declarations

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "lakeclaw",
    about = "LakeClaw: a tool-calling agent for your Databricks workspace",
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
    /// Write a default config file to ~/.lakeclaw/config.toml
    Init,

    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the workspace agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Session whose defaults (cluster, warehouse, ...) the agent uses
        #[arg(short, long, default_value = "default")]
        session: String,
    },

    /// Invoke one action directly
    Call {
        /// Action name, e.g. list_clusters
        action: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Session to resolve defaults against
        #[arg(short, long, default_value = "default")]
        session: String,
    },

    /// List actions, or print tool declarations in an engine format
    Actions {
        /// openai or anthropic
        #[arg(short, long)]
        format: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
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
        Commands::Init => commands::init::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat { message, session } => commands::chat::run(message, session).await?,
        Commands::Call {
            action,
            args,
            session,
        } => commands::call::run(action, args, session).await?,
        Commands::Actions { format } => commands::actions::run(format).await?,
    }

    Ok(())
}
