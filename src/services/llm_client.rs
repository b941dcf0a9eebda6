//! Chat-completion client for the recommendation step.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (Groq by
//! default). Every failure comes back as a [`RecommendationError`] with a
//! [`FailureKind`]; nothing escapes this module as a panic or untyped error.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, FailureKind, RecommendationError};
use crate::models::{Recommendation, RecommendationRequest, RecommendationResult};
use crate::services::retry::{with_retry, NoRetry, RetryPolicy};

/// Groq's OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Low temperature: technical consistency over creative variation.
const DEFAULT_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Settings for the completion endpoint.
#[derive(Clone, PartialEq)]
pub struct LlmConfig {
    /// Completion model identifier.
    pub model: String,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    pub api_key: String,
    /// API root; `/chat/completions` is appended.
    pub base_url: String,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl LlmConfig {
    pub fn builder() -> LlmConfigBuilder {
        LlmConfigBuilder::default()
    }
}

/// Builder for [`LlmConfig`].
#[derive(Default)]
pub struct LlmConfigBuilder {
    model: Option<String>,
    temperature: Option<f32>,
    timeout: Option<Duration>,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl LlmConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Clamped to `[0, 1]` on build.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn build(self) -> LlmConfig {
        let temperature = self.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        LlmConfig {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: if temperature.is_nan() { DEFAULT_TEMPERATURE } else { temperature.clamp(0.0, 1.0) },
            timeout: self.timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            api_key: self.api_key.unwrap_or_default(),
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

/// Text-completion capability used by the orchestrator.
///
/// Implementations must turn every failure into a typed
/// [`RecommendationError`] instead of panicking.
pub trait CompletionClient: Send + Sync {
    fn invoke(&self, request: &RecommendationRequest) -> impl Future<Output = RecommendationResult> + Send;
}

pub struct LlmClient {
    http: Client,
    config: LlmConfig,
    retry: Arc<dyn RetryPolicy>,
}

impl LlmClient {
    /// Single-attempt client, matching the plain request/response contract.
    pub fn new(config: LlmConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            retry: Arc::new(NoRetry),
        })
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry = Arc::new(policy);
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn send_once(&self, prompt: &str) -> Result<String, RecommendationError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let raw = response.text().await.map_err(classify_reqwest_error)?;

        if !status.is_success() {
            return Err(classify_status(status, &raw));
        }
        extract_content(&raw)
    }
}

impl CompletionClient for LlmClient {
    async fn invoke(&self, request: &RecommendationRequest) -> RecommendationResult {
        let start = Instant::now();
        tracing::info!(
            "Requesting recommendation from {} ({} prompt chars, {} sample rows)",
            self.config.model,
            request.prompt.len(),
            request.sample_rows
        );

        let this = self;
        let prompt = request.prompt.as_str();
        let (outcome, attempts) = with_retry(this.retry.as_ref(), move |attempt| {
            tracing::debug!("Completion attempt {}", attempt);
            this.send_once(prompt)
        })
        .await;

        match outcome {
            Ok(text) => {
                tracing::info!(
                    "Recommendation received in {:?} after {} attempt(s), {} chars",
                    start.elapsed(),
                    attempts,
                    text.len()
                );
                Ok(Recommendation {
                    text,
                    model: self.config.model.clone(),
                    attempts,
                })
            }
            Err(err) => {
                tracing::warn!(
                    "Recommendation failed after {} attempt(s) in {:?}: {}",
                    attempts,
                    start.elapsed(),
                    err
                );
                Err(err)
            }
        }
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> RecommendationError {
    if err.is_decode() {
        RecommendationError::provider(format!("Unreadable response body: {}", err))
    } else if err.is_timeout() {
        RecommendationError::transport(format!("Request timed out: {}", err))
    } else {
        RecommendationError::transport(format!("Request failed: {}", err))
    }
}

fn classify_status(status: StatusCode, body: &str) -> RecommendationError {
    let detail = provider_message(body).unwrap_or_else(|| body.trim().to_string());
    let message = format!("HTTP {}: {}", status.as_u16(), detail);

    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::Auth,
        StatusCode::REQUEST_TIMEOUT => FailureKind::Transport,
        s if s.is_server_error() => FailureKind::Transport,
        _ => FailureKind::Provider,
    };
    RecommendationError::new(kind, message)
}

/// `error.message` from an OpenAI-style error body, if present.
fn provider_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

fn extract_content(raw: &str) -> Result<String, RecommendationError> {
    let parsed: ChatResponse = serde_json::from_str(raw)
        .map_err(|e| RecommendationError::provider(format!("Malformed completion response: {}", e)))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| RecommendationError::provider("Completion response has no content"))?;

    if text.trim().is_empty() {
        return Err(RecommendationError::provider("Completion response is empty"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = LlmConfig::builder().api_key("gsk_test").build();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn temperature_is_clamped() {
        assert_eq!(LlmConfig::builder().temperature(1.7).build().temperature, 1.0);
        assert_eq!(LlmConfig::builder().temperature(-0.3).build().temperature, 0.0);
    }

    #[test]
    fn debug_output_hides_the_credential() {
        let config = LlmConfig::builder().api_key("gsk_secret_value").build();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("gsk_secret_value"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn status_codes_are_classified() {
        let body = r#"{"error":{"message":"Invalid API Key","type":"invalid_request_error"}}"#;
        let err = classify_status(StatusCode::UNAUTHORIZED, body);
        assert_eq!(err.kind, FailureKind::Auth);
        assert_eq!(err.message, "HTTP 401: Invalid API Key");

        assert_eq!(classify_status(StatusCode::FORBIDDEN, "").kind, FailureKind::Auth);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").kind, FailureKind::Provider);
        assert_eq!(classify_status(StatusCode::NOT_FOUND, "").kind, FailureKind::Provider);
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").kind, FailureKind::Transport);
        assert_eq!(classify_status(StatusCode::REQUEST_TIMEOUT, "").kind, FailureKind::Transport);
    }

    #[test]
    fn non_json_error_body_is_surfaced_verbatim() {
        let err = classify_status(StatusCode::BAD_REQUEST, "  model not found \n");
        assert_eq!(err.message, "HTTP 400: model not found");
    }

    #[test]
    fn content_is_extracted_from_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"- **Issue 1:** duplicates"}}]}"#;
        assert_eq!(extract_content(raw).unwrap(), "- **Issue 1:** duplicates");
    }

    #[test]
    fn empty_or_missing_content_is_a_provider_failure() {
        for raw in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":"   "}}]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{}"#,
            "<html>gateway</html>",
        ] {
            let err = extract_content(raw).unwrap_err();
            assert_eq!(err.kind, FailureKind::Provider, "body: {}", raw);
        }
    }
}
