//! Gemini `generateContent` REST adapter.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::retry::{generate_with_retry, RetryPolicy};
use super::{ContentGenerator, GenerationError, GenerationErrorKind};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Model selection and sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GeminiSettings {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    /// Per-call HTTP timeout. A timed-out call is retried as `Unavailable` and reported as 504.
    pub request_timeout: Duration,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GenerateContentResponse {
    /// Concatenates the text parts of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

/// Builds a classified error from a non-2xx provider response.
fn error_from_response(status: u16, body: &str) -> GenerationError {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => GenerationError::classify(
            Some(status),
            envelope.error.status.as_deref(),
            &envelope.error.message,
        ),
        Err(_) => GenerationError::classify(Some(status), None, body),
    }
}

fn error_from_transport(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        return GenerationError::timeout(err.to_string());
    }
    if err.is_connect() {
        return GenerationError {
            status: err.status().map(|s| s.as_u16()),
            ..GenerationError::new(GenerationErrorKind::Unavailable, err.to_string())
        };
    }
    GenerationError::classify(err.status().map(|s| s.as_u16()), None, &err.to_string())
}

/// Production `ContentGenerator` backed by the Gemini REST API.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    settings: GeminiSettings,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(api_key: String, settings: GeminiSettings, retry: RetryPolicy) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("Gemini API key is empty");
        }

        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            settings,
            retry,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.model
        )
    }

    /// One request, no retries. Blank answers are handled by the retry driver.
    async fn call_once(&self, prompt: &str) -> Result<String, GenerationError> {
        let request_body = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
                top_p: self.settings.top_p,
                top_k: self.settings.top_k,
                max_output_tokens: self.settings.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(error_from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status.as_u16(), &body));
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(error_from_transport)?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "Gemini call succeeded: prompt_tokens={}, output_tokens={}, finish_reason={:?}",
                usage.prompt_token_count,
                usage.candidates_token_count,
                parsed.candidates.first().and_then(|c| c.finish_reason.as_deref())
            );
        }

        Ok(parsed.text())
    }
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(
            model = %self.settings.model,
            prompt_length = prompt.len(),
            "Generating content"
        );
        generate_with_retry(&self.retry, |_| self.call_once(prompt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_joins_parts_of_first_candidate() {
        let json = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Hello, "}, {"text": "world"}]}, "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 3}
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text(), "Hello, world");
    }

    #[test]
    fn test_blocked_prompt_yields_blank_text() {
        let json = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.text().is_empty());
    }

    #[test]
    fn test_error_envelope_is_classified() {
        let body = r#"{"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}"#;
        let err = error_from_response(429, body);
        assert_eq!(err.kind, GenerationErrorKind::RateLimited);
        assert_eq!(err.message, "Resource has been exhausted");

        let err = error_from_response(500, r#"{"error": {"message": "x", "status": "UNAVAILABLE"}}"#);
        assert_eq!(err.kind, GenerationErrorKind::Unavailable);
    }

    #[test]
    fn test_unparseable_error_body_falls_back_to_raw_text() {
        let err = error_from_response(500, "upstream timeout");
        assert_eq!(err.kind, GenerationErrorKind::Unavailable);
        assert!(err.timed_out);
        assert_eq!(err.status, Some(500));
    }

    #[test]
    fn test_request_uses_camel_case_generation_config() {
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: "hi" }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                top_p: 0.9,
                top_k: 20,
                max_output_tokens: 100,
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 100);
        assert_eq!(value["generationConfig"]["topK"], 20);
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        let result = GeminiClient::new(
            "  ".to_string(),
            GeminiSettings::default(),
            RetryPolicy::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoint_includes_model() {
        let settings = GeminiSettings {
            api_base: "http://localhost:9999/v1beta/".to_string(),
            ..GeminiSettings::default()
        };
        let client =
            GeminiClient::new("key".to_string(), settings, RetryPolicy::default()).unwrap();
        assert_eq!(
            client.endpoint(),
            format!("http://localhost:9999/v1beta/models/{DEFAULT_MODEL}:generateContent")
        );
    }
}
