//! Error types for the kiln domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; only exhaustion errors
//! (`StoreError::NotFound`, `ProviderError::AllFailed`) and load failures
//! cross the engine boundary — tier and single-provider failures are
//! recovered internally by fallthrough.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all kiln operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Prompt store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors surfaced by the prompt store to its callers.
///
/// Tier-level failures never appear here — they are swallowed inside the
/// store and turned into fallthrough. A caller only ever sees a definitive
/// miss or a failed bulk load.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}", not_found_msg(.name, .version))]
    NotFound {
        name: String,
        version: Option<String>,
    },

    #[error("bulk load failed: {0}")]
    Load(#[from] LoadError),
}

fn not_found_msg(name: &str, version: &Option<String>) -> String {
    match version {
        Some(v) => format!("prompt not found: {name} (version {v})"),
        None => format!("prompt not found: {name}"),
    }
}

/// A tier operation failed for infrastructural reasons.
///
/// Distinguishable from "no data": `Ok(None)` from a tier means a
/// definitive miss, `Err(TierError)` means the tier could not answer and
/// the store should fall through to the next one.
#[derive(Debug, Clone, Error)]
pub enum TierError {
    #[error("tier unreachable: {0}")]
    Unreachable(String),

    #[error("storage operation failed: {0}")]
    Storage(String),

    #[error("malformed persisted record: {0}")]
    Corrupt(String),

    #[error("migration failed: {0}")]
    Migration(String),
}

/// The bulk-source file could not be loaded.
///
/// Fatal to that load call only — callers must leave prior state untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("prompt file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("unsupported prompt file format: {} (use .yaml, .yml, or .json)", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("no prompt file configured")]
    NoPath,
}

/// Errors from a single provider backend, plus route exhaustion.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("all providers failed; last attempt '{provider}': {source}")]
    AllFailed {
        provider: String,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Wrap the final failure of an exhausted route, naming the last
    /// attempted provider.
    pub fn all_failed(provider: impl Into<String>, last: ProviderError) -> Self {
        Self::AllFailed {
            provider: provider.into(),
            source: Box::new(last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_displays_name_and_version() {
        let err = StoreError::NotFound {
            name: "summarizer".into(),
            version: Some("v2".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("summarizer"));
        assert!(msg.contains("v2"));
    }

    #[test]
    fn not_found_without_version() {
        let err = StoreError::NotFound {
            name: "summarizer".into(),
            version: None,
        };
        assert_eq!(err.to_string(), "prompt not found: summarizer");
    }

    #[test]
    fn all_failed_names_last_provider() {
        let err = ProviderError::all_failed(
            "claude:opus",
            ProviderError::AuthenticationFailed("bad key".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("claude:opus"));
        assert!(msg.contains("bad key"));
    }

    #[test]
    fn tier_error_is_distinguishable() {
        let err = TierError::Unreachable("connection refused".into());
        assert!(err.to_string().contains("unreachable"));
    }

    #[test]
    fn load_error_reports_path() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("/tmp/prompts.yaml"),
        };
        assert!(err.to_string().contains("/tmp/prompts.yaml"));
    }
}
