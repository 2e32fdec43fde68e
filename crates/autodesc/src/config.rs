// ABOUTME: LLM configuration resolved from environment variables.
// ABOUTME: Reads LLM_PROVIDER and the provider-specific model, key and base URL variables.

use std::fmt;
use std::time::Duration;

use crate::llm::{Provider, RetryPolicy};

/// Marker left in templates for values the user still has to fill in.
pub const PLACEHOLDER: &str = "<REPLACE_ME>";

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("LLM_PROVIDER is not set; choices are anthropic, openai, mistral")]
    MissingProvider,

    #[error("unsupported LLM_PROVIDER `{0}`; choices are anthropic, openai, mistral")]
    UnknownProvider(String),

    #[error("{variable} must be set to run {provider} queries")]
    Missing { variable: String, provider: Provider },

    #[error("{variable} has an invalid value `{value}`")]
    Invalid { variable: String, value: String },

    #[error("failed to build HTTP client: {0}")]
    Http(#[source] reqwest::Error),
}

/// Settings for talking to one LLM provider.
#[derive(Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    /// Total wall-clock budget for one refinement.
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != PLACEHOLDER)
}

impl LlmConfig {
    pub fn new(provider: Provider, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: api_key.into(),
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps variable names to values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = present(lookup("LLM_PROVIDER")).ok_or(ConfigError::MissingProvider)?;
        let provider: Provider = raw.parse().map_err(ConfigError::UnknownProvider)?;
        let prefix = provider.env_prefix();

        let required = |suffix: &str| {
            let variable = format!("{}_{}", prefix, suffix);
            present(lookup(&variable)).ok_or(ConfigError::Missing { variable, provider })
        };
        let model = required("MODEL_ID")?;
        let api_key = required("API_KEY")?;
        let base_url = present(lookup(&format!("{}_BASE_URL", prefix)));

        let timeout = match present(lookup("LLM_TIMEOUT_SECS")) {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        variable: "LLM_TIMEOUT_SECS".to_string(),
                        value,
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };
        let max_attempts = match present(lookup("LLM_MAX_ATTEMPTS")) {
            Some(value) => match value.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        variable: "LLM_MAX_ATTEMPTS".to_string(),
                        value,
                    })
                }
            },
            None => DEFAULT_MAX_ATTEMPTS,
        };

        Ok(Self {
            provider,
            model,
            api_key,
            base_url,
            timeout,
            max_attempts,
        })
    }

    /// Retry policy with this configuration's attempt count.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.max_attempts)
    }
}
