// ABOUTME: OpenAI chat completions adapter.
// ABOUTME: Bearer auth, system prompt as the first message, max_completion_tokens as the output limit.

use super::chat::{chat_completion, TokenLimitField};
use super::error::ProviderError;
use super::types::{LlmRequest, LlmResponse, Provider};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for the OpenAI chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
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
            Provider::OpenAi,
            &format!("{}/chat/completions", self.base_url),
            &self.api_key,
            &self.model,
            request,
            TokenLimitField::MaxCompletionTokens,
        )
        .await
    }
}
