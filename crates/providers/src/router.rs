//! Provider router — ordered failover over configured backends.
//!
//! The route is the primary id followed by the fallback ids, in listed
//! order, with duplicates and unknown ids skipped. Each request enforces
//! the token budget once, then attempts providers strictly sequentially:
//! one attempt per listed provider, no racing, no retry, no backoff.

use crate::anthropic::AnthropicBackend;
use crate::budget::ensure_within_budget;
use crate::openai_compat::OpenAiCompatBackend;
use kiln_core::error::ProviderError;
use kiln_core::provider::{Generation, OutputFormat, Provider};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Routes generation requests across providers with ordered failover.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    primary: String,
    fallbacks: Vec<String>,
    max_tokens: u32,
}

impl ProviderRouter {
    /// Create a new router with a primary provider id and token budget.
    pub fn new(primary: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            providers: HashMap::new(),
            primary: primary.into(),
            fallbacks: Vec::new(),
            max_tokens,
        }
    }

    /// Set the ordered fallback ids attempted after the primary.
    pub fn with_fallbacks(mut self, fallbacks: Vec<String>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Register a provider descriptor under its id.
    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(id.into(), provider);
    }

    /// Get a specific provider by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(id).cloned()
    }

    /// All registered provider ids.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    /// Build the ordered route: primary, then fallbacks. Duplicates and
    /// ids with no registered descriptor are skipped.
    pub fn route(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut route = Vec::new();

        for id in std::iter::once(self.primary.as_str())
            .chain(self.fallbacks.iter().map(|s| s.as_str()))
        {
            if !seen.insert(id) {
                continue;
            }
            if !self.providers.contains_key(id) {
                warn!(provider = id, "skipping unknown provider id in route");
                continue;
            }
            route.push(id);
        }

        route
    }

    /// Dispatch a generation request along the route.
    ///
    /// The budget is enforced exactly once; every provider on the route
    /// sees the same adjusted prompt. The first success wins and no
    /// further providers are attempted. An exhausted route fails with an
    /// error naming the last attempted provider.
    pub async fn route_and_generate(
        &self,
        prompt: &str,
        context_depth: u32,
        output_format: OutputFormat,
        system: Option<&str>,
    ) -> Result<Generation, ProviderError> {
        let route = self.route();
        let total = route.len();
        let adjusted = ensure_within_budget(prompt, context_depth, self.max_tokens);

        let mut last_failure: Option<(String, ProviderError)> = None;

        for (attempt, id) in route.into_iter().enumerate() {
            let provider = match self.providers.get(id) {
                Some(p) => p,
                None => continue,
            };

            info!(
                provider = id,
                attempt = attempt + 1,
                total,
                "attempting generation"
            );

            match provider.generate(adjusted, output_format, system).await {
                Ok(generation) => return Ok(generation),
                Err(e) => {
                    warn!(provider = id, error = %e, "provider failed, trying next");
                    last_failure = Some((id.to_string(), e));
                }
            }
        }

        match last_failure {
            Some((provider, err)) => Err(ProviderError::all_failed(provider, err)),
            None => Err(ProviderError::NotConfigured(
                "no providers in route".into(),
            )),
        }
    }
}

/// Build a router from configuration.
///
/// Every id named by the route (primary plus fallbacks) gets a backend
/// constructed for it: `claude:*`/`anthropic:*` ids use the native
/// Anthropic backend, everything else speaks the OpenAI dialect.
pub fn build_from_config(config: &kiln_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.primary, config.max_tokens)
        .with_fallbacks(config.fallbacks.clone());

    for id in config.route() {
        if router.get(id).is_some() {
            continue;
        }

        let (backend_name, model) = split_tag(id);
        let api_key = config.api_key_for(backend_name).unwrap_or_default();
        let api_url = config
            .providers
            .get(backend_name)
            .and_then(|p| p.api_url.clone());

        let provider: Arc<dyn Provider> = if matches!(backend_name, "claude" | "anthropic") {
            let mut backend = AnthropicBackend::new(id, model, &api_key);
            if let Some(url) = api_url {
                backend = backend.with_base_url(url);
            }
            Arc::new(backend)
        } else {
            let base_url = api_url.unwrap_or_else(|| default_base_url(backend_name));
            Arc::new(OpenAiCompatBackend::new(id, model, base_url, &api_key))
        };

        router.register(id, provider);
    }

    router
}

/// Split a provider id tag into backend name and model.
///
/// "openai:gpt-4" → ("openai", "gpt-4"); a bare backend name doubles as
/// its own model tag.
fn split_tag(id: &str) -> (&str, &str) {
    match id.split_once(':') {
        Some((backend, model)) if !model.is_empty() => (backend, model),
        _ => (id, id),
    }
}

/// Default base URL for well-known OpenAI-dialect backends.
fn default_base_url(backend_name: &str) -> String {
    match backend_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{backend_name}.api.example.com/v1"),
    }
}
