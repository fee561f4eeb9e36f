//! `kiln chat` — one message through the resolve → compile → route flow.

use anyhow::Context;
use kiln_config::AppConfig;
use kiln_core::OutputFormat;
use kiln_providers::budget::estimate_tokens;
use kiln_providers::{build_from_config, format_output};
use kiln_store::{compile, PromptStore};
use kiln_threads::{MessageMeta, ThreadJournal};
use std::collections::HashMap;

pub async fn run(
    message: &str,
    prompt: Option<&str>,
    prompt_version: Option<&str>,
    vars: &[String],
    format: Option<&str>,
    context_depth: u32,
) -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    let output_format: OutputFormat = format
        .unwrap_or(config.format.as_str())
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    // Resolve and compile the system directive, if one was named
    let mut resolved_version = None;
    let system = match prompt {
        Some(name) => {
            let store = PromptStore::from_config(&config).await?;
            let record = store
                .get(name, prompt_version)
                .await
                .with_context(|| format!("resolving prompt '{name}'"))?;
            resolved_version = record.version.clone();
            Some(compile(&record, &parse_vars(vars)?))
        }
        None => None,
    };

    let router = build_from_config(&config);
    let generation = router
        .route_and_generate(message, context_depth, output_format, system.as_deref())
        .await?;

    journal_exchange(&config, message, &generation, prompt, resolved_version).await;

    println!("{}", format_output(&generation.content, output_format));
    eprintln!("[provider: {}]", generation.provider_id);

    Ok(())
}

/// Best-effort: record the exchange in the conversation journal when a
/// SQLite database is configured. A journaling failure never fails the
/// chat itself.
async fn journal_exchange(
    config: &AppConfig,
    message: &str,
    generation: &kiln_core::Generation,
    prompt_name: Option<&str>,
    prompt_version: Option<String>,
) {
    let Some(url) = config.database_url.as_deref().filter(|u| u.starts_with("sqlite")) else {
        return;
    };

    let result = async {
        let journal = ThreadJournal::new(url).await?;
        let session = journal.create_session(None).await?;
        let thread = journal.create_thread(session.id, None).await?;
        journal
            .add_message(thread.id, "user", message, MessageMeta::default())
            .await?;
        journal
            .add_message(
                thread.id,
                "assistant",
                &generation.content,
                MessageMeta {
                    provider: Some(generation.provider_id.clone()),
                    prompt_name: prompt_name.map(|s| s.to_string()),
                    prompt_version,
                    token_count: Some(estimate_tokens(&generation.content) as i64),
                    cost_cents: None,
                },
            )
            .await?;
        Ok::<_, kiln_core::TierError>(())
    }
    .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to journal exchange");
    }
}

/// Parse repeated `--var key=value` arguments.
fn parse_vars(vars: &[String]) -> anyhow::Result<HashMap<String, String>> {
    vars.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("invalid --var '{pair}', expected KEY=VALUE"))
        })
        .collect()
}
