// ABOUTME: Uniform LLM completion layer over Anthropic, OpenAI and Mistral.
// ABOUTME: Exposes the CompletionBackend seam, the configured LlmClient and a connection ping.

//! LLM provider abstraction.
//!
//! Submodules:
//! - `types`: request/response envelope.
//! - `error`: provider errors and status classification.
//! - `anthropic`, `openai`, `mistral`: one adapter per provider; `chat`
//!   holds the HTTP plumbing they share.
//! - `retry`: retry policy with deadline and cancellation.
//! - `tokens`: token accounting.
//! - `refine`: description refinement prompt and reply parsing.

pub mod anthropic;
mod chat;
pub mod error;
pub mod mistral;
pub mod openai;
pub mod refine;
pub mod retry;
pub mod tokens;
pub mod types;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, LlmConfig};

pub use anthropic::AnthropicClient;
pub use error::ProviderError;
pub use mistral::MistralClient;
pub use openai::OpenAiClient;
pub use retry::RetryPolicy;
pub use types::{LlmRequest, LlmResponse, Message, Provider, Role, Usage};

/// Anything that can answer a completion request.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn provider(&self) -> Provider;

    fn model(&self) -> &str;

    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError>;
}

/// The backend selected by configuration.
#[derive(Debug, Clone)]
pub enum LlmClient {
    Anthropic(AnthropicClient),
    OpenAi(OpenAiClient),
    Mistral(MistralClient),
}

impl LlmClient {
    /// Build the adapter for the configured provider.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ConfigError::Http)?;
        let key = config.api_key.clone();
        let model = config.model.clone();
        let client = match config.provider {
            Provider::Anthropic => {
                let mut c = AnthropicClient::new(key, model).with_http_client(http);
                if let Some(base) = &config.base_url {
                    c = c.with_base_url(base.clone());
                }
                LlmClient::Anthropic(c)
            }
            Provider::OpenAi => {
                let mut c = OpenAiClient::new(key, model).with_http_client(http);
                if let Some(base) = &config.base_url {
                    c = c.with_base_url(base.clone());
                }
                LlmClient::OpenAi(c)
            }
            Provider::Mistral => {
                let mut c = MistralClient::new(key, model).with_http_client(http);
                if let Some(base) = &config.base_url {
                    c = c.with_base_url(base.clone());
                }
                LlmClient::Mistral(c)
            }
        };
        Ok(client)
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    fn provider(&self) -> Provider {
        match self {
            LlmClient::Anthropic(_) => Provider::Anthropic,
            LlmClient::OpenAi(_) => Provider::OpenAi,
            LlmClient::Mistral(_) => Provider::Mistral,
        }
    }

    fn model(&self) -> &str {
        match self {
            LlmClient::Anthropic(c) => c.model(),
            LlmClient::OpenAi(c) => c.model(),
            LlmClient::Mistral(c) => c.model(),
        }
    }

    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        match self {
            LlmClient::Anthropic(c) => c.complete(request).await,
            LlmClient::OpenAi(c) => c.complete(request).await,
            LlmClient::Mistral(c) => c.complete(request).await,
        }
    }
}

/// Send a short "ping" to confirm credentials and model are usable.
pub async fn test_connection<B>(
    backend: &B,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<LlmResponse, ProviderError>
where
    B: CompletionBackend + ?Sized,
{
    let request = LlmRequest::new("ping").with_max_tokens(16);
    retry::send_with_retry(backend, &request, policy, cancel).await
}
