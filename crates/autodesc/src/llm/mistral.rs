// ABOUTME: Mistral chat completions adapter.
// ABOUTME: OpenAI-shaped body under /v1/chat/completions with max_tokens as the output limit.

use super::chat::{chat_completion, TokenLimitField};
use super::error::ProviderError;
use super::types::{LlmRequest, LlmResponse, Provider};

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

/// Client for the Mistral chat completions endpoint.
#[derive(Clone)]
pub struct MistralClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for MistralClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl MistralClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        chat_completion(
            &self.http_client,
            Provider::Mistral,
            &format!("{}/v1/chat/completions", self.base_url),
            &self.api_key,
            &self.model,
            request,
            TokenLimitField::MaxTokens,
        )
        .await
    }
}
