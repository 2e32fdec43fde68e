// ABOUTME: Shared HTTP plumbing for provider adapters plus the OpenAI-shaped chat completions wire format.
// ABOUTME: Used directly by the OpenAI and Mistral adapters; the Anthropic adapter reuses post_json only.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{parse_retry_after, ProviderError};
use super::types::{LlmRequest, LlmResponse, Provider, Usage};

/// POST a JSON body and return the parsed JSON of a successful response.
pub(crate) async fn post_json<T, R>(
    http: &reqwest::Client,
    provider: Provider,
    url: &str,
    headers: HeaderMap,
    body: &T,
) -> Result<R, ProviderError>
where
    T: Serialize + ?Sized,
    R: for<'de> Deserialize<'de>,
{
    debug!(provider = %provider, url = %url, "sending completion request");
    let response = http
        .post(url)
        .headers(headers)
        .header(CONTENT_TYPE, "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| {
            warn!(provider = %provider, error = %e, "completion request failed");
            ProviderError::from_reqwest(provider, e)
        })?;

    let status = response.status();
    let retry_after = parse_retry_after(
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
    );
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e))?;

    if !status.is_success() {
        warn!(provider = %provider, status = %status, "provider returned error status");
        return Err(ProviderError::from_status(provider, status, &text, retry_after));
    }

    serde_json::from_str(&text).map_err(|e| {
        ProviderError::invalid_response(provider, format!("failed to parse response body: {}", e))
    })
}

/// Bearer authorization header map.
pub(crate) fn bearer_headers(provider: Provider, api_key: &str) -> Result<HeaderMap, ProviderError> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|_| {
        ProviderError::InvalidRequest {
            provider,
            status: 0,
            message: "API key contains characters not allowed in a header".to_string(),
        }
    })?;
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// Which field carries the output token limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenLimitField {
    MaxTokens,
    MaxCompletionTokens,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
}

// Content is a string, or a list of typed chunks on newer Mistral models
fn content_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

fn build_body<'a>(model: &'a str, request: &'a LlmRequest, field: TokenLimitField) -> ChatBody<'a> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.extend(request.messages.iter().map(|m| ChatMessage {
        role: m.role.as_str(),
        content: &m.content,
    }));
    let (max_tokens, max_completion_tokens) = match field {
        TokenLimitField::MaxTokens => (Some(request.max_tokens), None),
        TokenLimitField::MaxCompletionTokens => (None, Some(request.max_tokens)),
    };
    ChatBody {
        model,
        messages,
        temperature: request.temperature,
        max_tokens,
        max_completion_tokens,
    }
}

/// Run one OpenAI-shaped chat completion.
pub(crate) async fn chat_completion(
    http: &reqwest::Client,
    provider: Provider,
    url: &str,
    api_key: &str,
    model: &str,
    request: &LlmRequest,
    field: TokenLimitField,
) -> Result<LlmResponse, ProviderError> {
    let body = build_body(model, request, field);
    let headers = bearer_headers(provider, api_key)?;
    let parsed: ChatResponse = post_json(http, provider, url, headers, &body).await?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::invalid_response(provider, "response has no choices"))?;
    let text = choice
        .message
        .content
        .as_ref()
        .map(content_text)
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ProviderError::invalid_response(provider, "empty completion"));
    }

    Ok(LlmResponse {
        text,
        model: parsed.model.unwrap_or_else(|| model.to_string()),
        provider,
        usage: parsed.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u
                .total_tokens
                .unwrap_or(u.prompt_tokens + u.completion_tokens),
        }),
        finish_reason: choice.finish_reason,
    })
}
