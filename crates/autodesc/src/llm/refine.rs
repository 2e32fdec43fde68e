// ABOUTME: Description refinement prompt and model reply parsing.
// ABOUTME: Accepts the requested JSON object, fenced or escaped JSON, or a plain-text reply.

use crate::dom::normalize::normalize_text;

use super::types::LlmRequest;

/// The answer the model is told to give when the text holds no description.
pub const NO_DESCRIPTION: &str = "No description found.";

const MAX_OUTPUT_TOKENS: u32 = 2048;

pub const SYSTEM_PROMPT: &str = "You are a vehicle description isolation assistant. \
You will receive text copied from a dealership vehicle listing that may contain dealer information, \
feature lists, pricing and disclaimers. Extract only the vehicle's descriptive text verbatim, \
with no summaries or added text. The description may span one or more paragraphs. \
Respond ONLY with valid JSON in exactly this format: {\"description\": \"VEHICLE DESCRIPTION\"}. \
Escape double quotes inside the description with a backslash so the JSON stays valid. \
If no description can be found, set `description` to `No description found.`";

/// Build the refinement request for normalized page text.
pub fn build_request(text: &str) -> LlmRequest {
    LlmRequest::new(text)
        .with_system(SYSTEM_PROMPT)
        .with_temperature(0.0)
        .with_max_tokens(MAX_OUTPUT_TOKENS)
}

/// What the model made of the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refined {
    Description(String),
    NotFound,
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // drop a language tag such as `json`
    match inner.split_once('\n') {
        Some((tag, rest)) if !tag.trim().starts_with('{') => rest.trim(),
        _ => inner.trim(),
    }
}

fn description_from_json(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    match value {
        serde_json::Value::Object(map) => Some(
            map.get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("")
                .to_string(),
        ),
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}

/// Interpret a model reply.
pub fn parse_reply(reply: &str) -> Refined {
    let body = strip_fences(reply);
    let description = description_from_json(body)
        .or_else(|| description_from_json(&body.replace("\\\"", "\"")))
        .unwrap_or_else(|| body.to_string());

    let description = normalize_text(&description);
    let bare = description.trim().trim_end_matches('.');
    if bare.is_empty() || bare.eq_ignore_ascii_case(NO_DESCRIPTION.trim_end_matches('.')) {
        Refined::NotFound
    } else {
        Refined::Description(description)
    }
}
