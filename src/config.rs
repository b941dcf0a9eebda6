use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::AppError;
use crate::services::llm_client::LlmConfig;
use crate::services::prompt_builder::PromptSettings;
use crate::services::retry::ExponentialBackoff;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

/// Process-wide settings, read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_file_size: usize,
    pub bind_addr: SocketAddr,
    pub llm: LlmConfig,
    pub prompt: PromptSettings,
    pub max_attempts: u32,
}

impl Config {
    /// Loads `.env` (if any) and then reads the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file first
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GROQ_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Config("GROQ_API_KEY is not set".to_string()))?;

        let mut llm = LlmConfig::builder().api_key(api_key);
        if let Some(model) = lookup("LLM_MODEL") {
            llm = llm.model(model);
        }
        if let Some(temperature) = parse_var::<f32>(&lookup, "LLM_TEMPERATURE")? {
            llm = llm.temperature(temperature);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "LLM_TIMEOUT_SECS")? {
            llm = llm.timeout(Duration::from_secs(secs));
        }
        if let Some(base_url) = lookup("LLM_BASE_URL") {
            llm = llm.base_url(base_url);
        }

        let mut prompt = PromptSettings::default();
        if let Some(rows) = parse_var::<usize>(&lookup, "SAMPLE_ROWS")? {
            prompt.sample_rows = rows;
        }
        if let Some(idiom) = lookup("TARGET_IDIOM") {
            prompt.target_idiom = idiom;
        }

        let max_attempts = parse_var::<u32>(&lookup, "LLM_MAX_ATTEMPTS")?.unwrap_or(1);
        if max_attempts == 0 {
            return Err(AppError::Config("LLM_MAX_ATTEMPTS must be at least 1".to_string()));
        }

        Ok(Config {
            max_file_size: parse_var(&lookup, "MAX_UPLOAD_BYTES")?.unwrap_or_else(default_max_file_size),
            bind_addr: parse_var(&lookup, "BIND_ADDR")?.unwrap_or_else(default_bind_addr),
            llm: llm.build(),
            prompt,
            max_attempts,
        })
    }

    /// Backoff used when more than one attempt is configured.
    pub fn retry_policy(&self) -> Option<ExponentialBackoff> {
        (self.max_attempts > 1).then(|| ExponentialBackoff {
            max_attempts: self.max_attempts,
            ..ExponentialBackoff::default()
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{} has an invalid value '{}': {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_credential_is_fatal() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn blank_credential_is_fatal() {
        let err = Config::from_lookup(lookup_from(&[("GROQ_API_KEY", "   ")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn defaults_apply_when_only_credential_is_set() {
        let config = Config::from_lookup(lookup_from(&[("GROQ_API_KEY", "gsk_test")])).unwrap();
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.prompt.sample_rows, 5);
        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.max_attempts, 1);
        assert!(config.retry_policy().is_none());
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup_from(&[
            ("GROQ_API_KEY", "gsk_test"),
            ("LLM_MODEL", "mixtral"),
            ("LLM_TIMEOUT_SECS", "5"),
            ("SAMPLE_ROWS", "3"),
            ("TARGET_IDIOM", "Rust (polars)"),
            ("LLM_MAX_ATTEMPTS", "4"),
            ("BIND_ADDR", "0.0.0.0:8080"),
        ]))
        .unwrap();
        assert_eq!(config.llm.model, "mixtral");
        assert_eq!(config.llm.timeout, Duration::from_secs(5));
        assert_eq!(config.prompt.sample_rows, 3);
        assert_eq!(config.prompt.target_idiom, "Rust (polars)");
        assert_eq!(config.retry_policy().unwrap().max_attempts, 4);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("GROQ_API_KEY", "gsk_test"),
            ("LLM_TEMPERATURE", "warm"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("LLM_TEMPERATURE"));
    }
}
