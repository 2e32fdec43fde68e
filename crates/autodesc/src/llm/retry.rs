// ABOUTME: Retry policy for LLM calls with capped exponential backoff and per-attempt timeouts.
// ABOUTME: Honours retry-after, a caller-supplied total deadline and a cancellation token.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::ProviderError;
use super::types::{LlmRequest, LlmResponse};
use super::CompletionBackend;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Delay after the given failed attempt (1-indexed): base * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Send a request, retrying transient failures per `policy`.
///
/// Cancellation is checked before every attempt and while backing off.
pub async fn send_with_retry<B>(
    backend: &B,
    request: &LlmRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<LlmResponse, ProviderError>
where
    B: CompletionBackend + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = tokio::time::timeout(policy.attempt_timeout, backend.send(request)) => result,
        };

        let err = match outcome {
            Ok(Ok(response)) => {
                debug!(provider = %backend.provider(), attempt, "completion succeeded");
                return Ok(response);
            }
            Ok(Err(err)) => err,
            Err(_) => ProviderError::Timeout(policy.attempt_timeout),
        };

        if !err.is_retryable() {
            warn!(provider = %backend.provider(), attempt, error = %err, "completion failed");
            return Err(err);
        }
        if attempt >= max_attempts {
            warn!(provider = %backend.provider(), attempt, error = %err, "retries exhausted");
            return Err(ProviderError::Exhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = err
            .retry_after()
            .map(|d| d.min(policy.max_delay))
            .unwrap_or_else(|| policy.delay_for(attempt));
        warn!(
            provider = %backend.provider(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient completion failure, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// [`send_with_retry`] bounded by an overall wall-clock deadline.
pub async fn send_with_deadline<B>(
    backend: &B,
    request: &LlmRequest,
    policy: &RetryPolicy,
    deadline: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<LlmResponse, ProviderError>
where
    B: CompletionBackend + ?Sized,
{
    match deadline {
        Some(limit) => {
            match tokio::time::timeout(limit, send_with_retry(backend, request, policy, cancel)).await
            {
                Ok(result) => result,
                Err(_) => {
                    warn!(provider = %backend.provider(), deadline_ms = limit.as_millis() as u64, "refinement deadline exceeded");
                    Err(ProviderError::DeadlineExceeded(limit))
                }
            }
        }
        None => send_with_retry(backend, request, policy, cancel).await,
    }
}
