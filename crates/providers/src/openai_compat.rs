//! OpenAI-compatible backend implementation.
//!
//! Works with OpenAI and any endpoint exposing a compatible
//! `/chat/completions` API (OpenRouter, vLLM, Together, and friends).

use async_trait::async_trait;
use kiln_core::error::ProviderError;
use kiln_core::provider::{Generation, OutputFormat, Provider};
use serde::Deserialize;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A backend speaking the OpenAI chat-completions dialect.
pub struct OpenAiCompatBackend {
    id: String,
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    /// Create a new backend.
    ///
    /// `id` is the stable provider id carried in every `Generation`
    /// (e.g. "openai:gpt-4"); `model` is the model name put on the wire.
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            id: id.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI backend (convenience constructor).
    pub fn openai(id: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new(id, model, DEFAULT_BASE_URL, api_key)
    }

    /// Compose the effective system message for the requested format.
    fn effective_system(output_format: OutputFormat, system: Option<&str>) -> Option<String> {
        let format_note = match output_format {
            OutputFormat::Json => Some("Respond with a single JSON object."),
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
impl Provider for OpenAiCompatBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(
        &self,
        prompt: &str,
        output_format: OutputFormat,
        system: Option<&str>,
    ) -> Result<Generation, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::new();
        if let Some(system) = Self::effective_system(output_format, system) {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        if output_format == OutputFormat::Json {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        debug!(provider = %self.id, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedReply(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedReply("No choices in response".into()))?;

        Ok(Generation {
            content: choice.message.content.unwrap_or_default(),
            provider_id: self.id.clone(),
        })
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_normalizes_base_url() {
        let backend =
            OpenAiCompatBackend::new("openai:gpt-4", "gpt-4", "https://api.openai.com/v1/", "sk");
        assert_eq!(backend.id(), "openai:gpt-4");
        assert_eq!(backend.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn openai_constructor_uses_default_url() {
        let backend = OpenAiCompatBackend::openai("openai:gpt-4", "gpt-4", "sk");
        assert!(backend.base_url.contains("api.openai.com"));
        assert_eq!(backend.model, "gpt-4");
    }

    #[test]
    fn json_format_appends_instruction() {
        let system =
            OpenAiCompatBackend::effective_system(OutputFormat::Json, Some("You are terse."));
        let system = system.unwrap();
        assert!(system.starts_with("You are terse."));
        assert!(system.contains("JSON object"));
    }

    #[test]
    fn markdown_format_keeps_system_verbatim() {
        let system =
            OpenAiCompatBackend::effective_system(OutputFormat::Markdown, Some("You are terse."));
        assert_eq!(system.as_deref(), Some("You are terse."));
    }

    #[test]
    fn no_system_no_instruction_is_none() {
        assert!(OpenAiCompatBackend::effective_system(OutputFormat::Raw, None).is_none());
    }

    #[test]
    fn parse_api_response() {
        let data = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn parse_response_with_null_content() {
        let data = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
