// ABOUTME: Token accounting for completions: provider usage first, then local estimation.
// ABOUTME: Estimates with tiktoken for OpenAI models and a whitespace word count otherwise.

use super::types::{LlmResponse, Provider};

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimate the token count of `text` for a provider's model.
pub fn estimate_tokens(text: &str, provider: Provider, model: &str) -> usize {
    if provider == Provider::OpenAi {
        if let Ok(bpe) = tiktoken_rs::get_bpe_from_model(model) {
            return bpe.encode_with_special_tokens(text).len();
        }
    }
    word_count(text)
}

/// Total tokens of a completion: reported usage, else an estimate over the reply text.
pub fn token_count(response: &LlmResponse) -> usize {
    match response.usage {
        Some(usage) if usage.total_tokens > 0 => usage.total_tokens as usize,
        Some(usage) if usage.input_tokens + usage.output_tokens > 0 => {
            (usage.input_tokens + usage.output_tokens) as usize
        }
        _ => estimate_tokens(&response.text, response.provider, &response.model),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Usage;

    fn response(provider: Provider, model: &str, usage: Option<Usage>) -> LlmResponse {
        LlmResponse {
            text: "Clean one owner truck with new tires".to_string(),
            model: model.to_string(),
            provider,
            usage,
            finish_reason: None,
        }
    }

    #[test]
    fn reported_usage_wins() {
        let r = response(Provider::Anthropic, "claude", Some(Usage::new(100, 20)));
        assert_eq!(token_count(&r), 120);
    }

    #[test]
    fn zero_total_falls_back_to_parts() {
        let usage = Usage {
            input_tokens: 7,
            output_tokens: 3,
            total_tokens: 0,
        };
        assert_eq!(token_count(&response(Provider::Mistral, "m", Some(usage))), 10);
    }

    #[test]
    fn non_openai_estimate_is_word_count() {
        assert_eq!(token_count(&response(Provider::Mistral, "mistral-small", None)), 7);
    }

    #[test]
    fn openai_estimate_uses_tokenizer() {
        let n = estimate_tokens("hello world", Provider::OpenAi, "gpt-4o");
        assert!(n >= 2 && n <= 4, "unexpected token count {}", n);
    }

    #[test]
    fn unknown_openai_model_falls_back_to_words() {
        assert_eq!(estimate_tokens("a b c", Provider::OpenAi, "not-a-model"), 3);
    }
}
