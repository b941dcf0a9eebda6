use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde::Serialize;
use serde_json::json;
use axum::Json;
use thiserror::Error;

/// Classified reasons a completion call can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// Network error, timeout, or upstream outage.
    #[serde(rename = "RecommendationTransportError")]
    Transport,
    /// Credential rejected by the provider.
    #[serde(rename = "RecommendationAuthError")]
    Auth,
    /// Provider refused the request or answered with something unusable.
    #[serde(rename = "RecommendationProviderError")]
    Provider,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "RecommendationTransportError",
            FailureKind::Auth => "RecommendationAuthError",
            FailureKind::Provider => "RecommendationProviderError",
        }
    }

    /// Only transport failures are worth repeating without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transport)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct RecommendationError {
    pub kind: FailureKind,
    pub message: String,
}

impl RecommendationError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Provider, message)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Malformed dataset: {0}")]
    MalformedDataset(String),
    #[error("Profiling error: {0}")]
    ProfilingInternal(String),
    #[error(transparent)]
    Recommendation(#[from] RecommendationError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MalformedDataset(_) => "MALFORMED_DATASET",
            AppError::ProfilingInternal(_) => "PROFILING_INTERNAL",
            AppError::Recommendation(err) => match err.kind {
                FailureKind::Transport => "RECOMMENDATION_TRANSPORT",
                FailureKind::Auth => "RECOMMENDATION_AUTH",
                FailureKind::Provider => "RECOMMENDATION_PROVIDER",
            },
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Config(_) => "CONFIG",
            AppError::Io(_) => "IO",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MalformedDataset(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::ProfilingInternal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // The credential belongs to this service, not to the caller.
            AppError::Recommendation(err) => match err.kind {
                FailureKind::Transport => StatusCode::GATEWAY_TIMEOUT,
                FailureKind::Auth | FailureKind::Provider => StatusCode::BAD_GATEWAY,
            },
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.error_code(),
        }));

        (status, body).into_response()
    }
}
