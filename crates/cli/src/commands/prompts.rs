//! `kiln prompts` — list, inspect, and reload the prompt store.

use clap::Subcommand;
use kiln_config::AppConfig;
use kiln_store::PromptStore;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum PromptsCommand {
    /// List all resolvable prompt names
    List,

    /// Show one prompt record
    Get {
        /// The prompt name
        name: String,

        /// Version label (or "latest")
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Reload the bulk prompt file
    Reload {
        /// Load from this path instead of the configured one
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

pub async fn run(command: PromptsCommand) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let store = PromptStore::from_config(&config).await?;

    match command {
        PromptsCommand::List => {
            let names = store.names().await;
            if let Some(source) = store.source_path().await {
                println!("source: {}", source.display());
            }
            if names.is_empty() {
                println!("(no prompts)");
            }
            for name in names {
                println!("{name}");
            }
        }
        PromptsCommand::Get { name, version } => {
            let record = store.get(&name, version.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        PromptsCommand::Reload { path } => {
            let summary = store.reload(path.as_deref()).await?;
            println!(
                "reloaded {} prompts from {}",
                summary.count,
                summary.source_path.display()
            );
        }
    }

    Ok(())
}

pub async fn run_versions(name: &str) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let store = PromptStore::from_config(&config).await?;

    let versions = store.versions(name).await;
    if versions.is_empty() {
        println!("(no versions for {name})");
    }
    for version in versions {
        println!("{version}");
    }

    Ok(())
}
