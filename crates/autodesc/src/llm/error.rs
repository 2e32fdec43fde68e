// ABOUTME: Provider error type with status-code classification into auth, invalid and transient faults.
// ABOUTME: Only transient faults and attempt timeouts are retried.

use std::time::Duration;

use reqwest::StatusCode;

use super::types::Provider;

/// Longest error body kept in messages.
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} authentication failed (HTTP {status}): {message}")]
    Auth {
        provider: Provider,
        status: u16,
        message: String,
    },

    #[error("{provider} rejected the request (HTTP {status}): {message}")]
    InvalidRequest {
        provider: Provider,
        status: u16,
        message: String,
    },

    #[error("{provider} transient failure: {message}")]
    Transient {
        provider: Provider,
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("{provider} returned an unusable response: {message}")]
    InvalidResponse { provider: Provider, message: String },

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("refinement deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Transient faults and attempt timeouts may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient { .. } | ProviderError::Timeout(_)
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }

    /// Server-requested delay before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(
        provider: Provider,
        status: StatusCode,
        body: &str,
        retry_after: Option<Duration>,
    ) -> Self {
        let message = error_message(body, status);
        let code = status.as_u16();
        match code {
            401 | 403 => ProviderError::Auth {
                provider,
                status: code,
                message,
            },
            408 | 409 | 425 | 429 | 529 => ProviderError::Transient {
                provider,
                status: Some(code),
                message,
                retry_after,
            },
            c if c >= 500 => ProviderError::Transient {
                provider,
                status: Some(code),
                message,
                retry_after,
            },
            _ => ProviderError::InvalidRequest {
                provider,
                status: code,
                message,
            },
        }
    }

    /// Network-level failures are transient.
    pub fn from_reqwest(provider: Provider, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            format!("request failed: {}", err)
        };
        ProviderError::Transient {
            provider,
            status: None,
            message,
            retry_after: None,
        }
    }

    pub fn invalid_response(provider: Provider, message: impl Into<String>) -> Self {
        ProviderError::InvalidResponse {
            provider,
            message: message.into(),
        }
    }
}

/// Pull a readable message out of a provider error body.
fn error_message(body: &str, status: StatusCode) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .or_else(|| v.get("detail"))
                .and_then(|m| m.as_str().map(str::to_string))
        });
    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string();
    }
    message.chars().take(MAX_ERROR_BODY).collect()
}

/// Parse a `retry-after` header given in seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    let secs: f64 = value?.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}
