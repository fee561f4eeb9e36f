//! Anthropic native backend implementation.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible
//! proxy): `x-api-key` header authentication, `anthropic-version`
//! header, system prompt as a top-level field.

use async_trait::async_trait;
use kiln_core::error::ProviderError;
use kiln_core::provider::{Generation, OutputFormat, Provider};
use serde::Deserialize;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API backend.
pub struct AnthropicBackend {
    id: String,
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    /// Create a new Anthropic backend.
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            id: id.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn effective_system(output_format: OutputFormat, system: Option<&str>) -> Option<String> {
        let format_note = match output_format {
            OutputFormat::Json => Some("Respond with a single JSON object and nothing else."),
            OutputFormat::Markdown | OutputFormat::Raw => None,
        };
        match (system, format_note) {
            (Some(s), Some(note)) => Some(format!("{s}\n\n{note}")),
            (Some(s), None) => Some(s.to_string()),
            (None, Some(note)) => Some(note.to_string()),
            (None, None) => None,
        }
    }
}

#[async_trait]
impl Provider for AnthropicBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(
        &self,
        prompt: &str,
        output_format: OutputFormat,
        system: Option<&str>,
    ) -> Result<Generation, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(system) = Self::effective_system(output_format, system) {
            body["system"] = serde_json::json!(system);
        }

        debug!(provider = %self.id, model = %self.model, "Sending messages request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedReply(format!("Failed to parse response: {e}")))?;

        let content = api_response
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(ProviderError::MalformedReply(
                "No text content in response".into(),
            ));
        }

        Ok(Generation {
            content,
            provider_id: self.id.clone(),
        })
    }
}

// --- Anthropic API types (internal) ---

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_sets_id_and_model() {
        let backend = AnthropicBackend::new("claude:opus", "claude-3-opus-20240229", "sk");
        assert_eq!(backend.id(), "claude:opus");
        assert_eq!(backend.model, "claude-3-opus-20240229");
        assert!(backend.base_url.contains("api.anthropic.com"));
    }

    #[test]
    fn custom_base_url_trims_trailing_slash() {
        let backend =
            AnthropicBackend::new("claude:opus", "claude-3-opus", "sk").with_base_url("http://localhost:8080/");
        assert_eq!(backend.base_url, "http://localhost:8080");
    }

    #[test]
    fn json_instruction_without_system() {
        let system = AnthropicBackend::effective_system(OutputFormat::Json, None);
        assert!(system.unwrap().contains("JSON object"));
    }

    #[test]
    fn parse_messages_response() {
        let data = r#"{"content":[{"type":"text","text":"Hello "},{"type":"text","text":"there"}]}"#;
        let parsed: MessagesResponse = serde_json::from_str(data).unwrap();
        let text: String = parsed
            .content
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect();
        assert_eq!(text, "Hello there");
    }

    #[test]
    fn parse_response_without_text_blocks() {
        let data = r#"{"content":[{"type":"tool_use","id":"x"}]}"#;
        let parsed: MessagesResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.content[0].text.is_none());
    }
}
