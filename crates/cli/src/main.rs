//! kiln CLI — the main entry point.
//!
//! Commands:
//! - `prompts`  — List, inspect, and reload the prompt store
//! - `versions` — List the version labels known for a prompt
//! - `chat`     — Send one message through the provider route

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "kiln",
    about = "kiln — prompt store and provider routing",
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
    /// Work with the prompt store
    Prompts {
        #[command(subcommand)]
        command: commands::prompts::PromptsCommand,
    },

    /// List the version labels known for a prompt
    Versions {
        /// The prompt name
        name: String,
    },

    /// Send one message through the provider route
    Chat {
        /// The user message
        message: String,

        /// Resolve this prompt as the system directive
        #[arg(short, long)]
        prompt: Option<String>,

        /// Prompt version label (or "latest")
        #[arg(long)]
        prompt_version: Option<String>,

        /// Template variable, repeatable: --var name=value
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Output format: markdown, json, or raw
        #[arg(short, long)]
        format: Option<String>,

        /// Context depth used for budget enforcement
        #[arg(long, default_value_t = 0)]
        context_depth: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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
        Commands::Prompts { command } => commands::prompts::run(command).await?,
        Commands::Versions { name } => commands::prompts::run_versions(&name).await?,
        Commands::Chat {
            message,
            prompt,
            prompt_version,
            vars,
            format,
            context_depth,
        } => {
            commands::chat::run(
                &message,
                prompt.as_deref(),
                prompt_version.as_deref(),
                &vars,
                format.as_deref(),
                context_depth,
            )
            .await?
        }
    }

    Ok(())
}
