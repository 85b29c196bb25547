//! Slothtop CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive chat with the assistant
//! - `ask`: Send a single message
//! - `settings`: Inspect and edit the agent settings
//! - `models`: List models installed on the backend
//! - `tools`: List the built-in tools
//! - `monitor`: Stream CPU or GPU samples

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "slothtop",
    about = "Slothtop — a local desktop AI assistant",
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
    /// Chat with the assistant interactively
    Chat,

    /// Send a single message and print the answer
    Ask {
        /// The message to send
        message: String,

        /// Print the full invocation result (answer, trace, stop reason) as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect and edit the agent settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// List models installed on the backend
    Models,

    /// List the built-in tools
    Tools,

    /// Print hardware samples until Ctrl-C
    Monitor {
        /// `cpu` or `gpu`
        kind: String,

        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show every agent setting
    Show,
    /// Print one setting
    Get { field: String },
    /// Change one setting
    Set { field: String, value: String },
    /// Print the settings file location
    Path,
    /// Write a default settings file if none exists
    Init,
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
        .init();

    match cli.command {
        Commands::Chat => commands::chat::run().await?,
        Commands::Ask { message, json } => commands::ask::run(&message, json).await?,
        Commands::Settings { action } => match action {
            SettingsAction::Show => commands::settings::show()?,
            SettingsAction::Get { field } => commands::settings::get(&field)?,
            SettingsAction::Set { field, value } => commands::settings::set(&field, &value)?,
            SettingsAction::Path => commands::settings::path()?,
            SettingsAction::Init => commands::settings::init()?,
        },
        Commands::Models => commands::models::run().await?,
        Commands::Tools => commands::tools::run()?,
        Commands::Monitor { kind, seconds } => commands::monitor::run(&kind, seconds).await?,
    }

    Ok(())
}
