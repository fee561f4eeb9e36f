//! Provider trait — the abstraction over text-generation backends.
//!
//! A Provider knows how to turn a prompt (plus an optional system
//! directive) into generated content. The router calls `generate()`
//! without knowing which backend is behind it — pure polymorphism.
//!
//! Implementations: OpenAI-compatible, Anthropic-native, test mocks.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requested shape of the generated content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Prose with Markdown formatting (default)
    #[default]
    Markdown,
    /// A single JSON object
    Json,
    /// Plain text, no formatting contract
    Raw,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Raw => "raw",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "raw" | "text" => Ok(Self::Raw),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// A successful generation: the content plus the id of the provider that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// The generated content
    pub content: String,

    /// Which provider actually responded (a backend+model tag such as
    /// `openai:gpt-4`)
    pub provider_id: String,
}

/// The core Provider trait.
///
/// Every backend implements this single capability. May fail for any
/// reason (auth, network, malformed reply) — the failure reason is opaque
/// to the router beyond "this provider failed."
#[async_trait]
pub trait Provider: Send + Sync {
    /// The stable id of this provider (e.g. `openai:gpt-4`, `claude:opus`).
    fn id(&self) -> &str;

    /// Generate a response for the prompt.
    async fn generate(
        &self,
        prompt: &str,
        output_format: OutputFormat,
        system: Option<&str>,
    ) -> std::result::Result<Generation, ProviderError>;

    /// Health check — can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
