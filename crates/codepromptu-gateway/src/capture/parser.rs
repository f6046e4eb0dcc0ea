//! Provider JSON parsing: normalized prompt text, model, sampling
//! parameters and token usage.
//!
//! Total functions: malformed input records a parse error and falls back to
//! the bounded raw body, it never fails the capture.

use serde_json::{Map, Value};

use codepromptu_types::{Provider, TokenUsage};

/// Cap on raw-body fallback text, in bytes.
const RAW_FALLBACK_MAX: usize = 8_192;

/// OpenAI sampling parameters lifted into usage metadata.
const OPENAI_SAMPLING_KEYS: &[&str] = &[
    "temperature",
    "max_tokens",
    "top_p",
    "frequency_penalty",
    "presence_penalty",
    "stop",
];

/// Anthropic sampling parameters lifted into usage metadata.
const ANTHROPIC_SAMPLING_KEYS: &[&str] =
    &["temperature", "max_tokens", "top_p", "top_k", "stop_sequences"];

/// Google sampling parameters (inside `generationConfig`).
const GOOGLE_SAMPLING_KEYS: &[&str] = &["temperature", "maxOutputTokens", "topP", "topK"];

/// Normalized view of a provider request body.
#[derive(Debug, Clone, Default)]
pub struct ParsedRequest {
    /// Concatenated prompt text, role-prefixed for chat shapes.
    pub prompt_text: String,
    /// Model named in the body, when present.
    pub model: Option<String>,
    /// Sampling parameters present in the body.
    pub sampling: Map<String, Value>,
    /// Set when the body could not be parsed as the provider shape.
    pub parse_error: Option<String>,
}

/// Normalized view of a provider response body.
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    /// Assistant text, when extractable.
    pub response_text: Option<String>,
    /// Model echoed by the provider, when present.
    pub model: Option<String>,
    /// Token accounting, when the body carries a usage object.
    pub token_usage: Option<TokenUsage>,
    /// Set when the body could not be parsed as the provider shape.
    pub parse_error: Option<String>,
}

/// Extract the normalized prompt tuple from a request body.
#[must_use]
pub fn parse_request(provider: Provider, body: &[u8]) -> ParsedRequest {
    let json: Value = match serde_json::from_slice(body) {
        Ok(json) => json,
        Err(error) => {
            return ParsedRequest {
                prompt_text: raw_fallback(body),
                parse_error: Some(error.to_string()),
                ..ParsedRequest::default()
            };
        }
    };
    match provider {
        Provider::Openai => parse_openai_request(&json, body),
        Provider::Anthropic => parse_anthropic_request(&json, body),
        Provider::GoogleAi => parse_google_request(&json, body),
    }
}

/// Extract assistant text and token usage from a response body.
#[must_use]
pub fn parse_response(provider: Provider, body: &[u8]) -> ParsedResponse {
    let json: Value = match serde_json::from_slice(body) {
        Ok(json) => json,
        Err(error) => {
            return ParsedResponse {
                parse_error: Some(error.to_string()),
                ..ParsedResponse::default()
            };
        }
    };
    let model = json.get("model").and_then(Value::as_str).map(String::from);
    let (response_text, token_usage) = match provider {
        Provider::Openai => (openai_response_text(&json), openai_usage(&json)),
        Provider::Anthropic => (anthropic_response_text(&json), anthropic_usage(&json)),
        Provider::GoogleAi => (google_response_text(&json), google_usage(&json)),
    };
    ParsedResponse {
        response_text,
        model,
        token_usage,
        parse_error: None,
    }
}

fn parse_openai_request(json: &Value, body: &[u8]) -> ParsedRequest {
    let model = json.get("model").and_then(Value::as_str).map(String::from);
    let sampling = lift_sampling(json, OPENAI_SAMPLING_KEYS);

    // Chat shape first, then the legacy completions `prompt`.
    if let Some(messages) = json.get("messages").and_then(Value::as_array) {
        return ParsedRequest {
            prompt_text: concat_messages(messages),
            model,
            sampling,
            parse_error: None,
        };
    }
    if let Some(prompt) = json.get("prompt") {
        return ParsedRequest {
            prompt_text: prompt_field_text(prompt),
            model,
            sampling,
            parse_error: None,
        };
    }
    ParsedRequest {
        prompt_text: raw_fallback(body),
        model,
        sampling,
        parse_error: Some("neither messages nor prompt present".to_string()),
    }
}

fn parse_anthropic_request(json: &Value, body: &[u8]) -> ParsedRequest {
    let model = json.get("model").and_then(Value::as_str).map(String::from);
    let sampling = lift_sampling(json, ANTHROPIC_SAMPLING_KEYS);

    if let Some(messages) = json.get("messages").and_then(Value::as_array) {
        let mut turns = Vec::new();
        if let Some(system) = json.get("system").and_then(Value::as_str) {
            turns.push(format!("system: {system}"));
        }
        turns.push(concat_messages(messages));
        return ParsedRequest {
            prompt_text: turns.join("\n"),
            model,
            sampling,
            parse_error: None,
        };
    }
    if let Some(prompt) = json.get("prompt").and_then(Value::as_str) {
        return ParsedRequest {
            prompt_text: prompt.to_string(),
            model,
            sampling,
            parse_error: None,
        };
    }
    ParsedRequest {
        prompt_text: raw_fallback(body),
        model,
        sampling,
        parse_error: Some("neither messages nor prompt present".to_string()),
    }
}

fn parse_google_request(json: &Value, body: &[u8]) -> ParsedRequest {
    let sampling = json
        .get("generationConfig")
        .map(|config| lift_sampling(config, GOOGLE_SAMPLING_KEYS))
        .unwrap_or_default();

    let Some(contents) = json.get("contents").and_then(Value::as_array) else {
        return ParsedRequest {
            prompt_text: raw_fallback(body),
            model: None,
            sampling,
            parse_error: Some("contents missing".to_string()),
        };
    };
    let parts: Vec<String> = contents
        .iter()
        .filter_map(|content| content.get("parts").and_then(Value::as_array))
        .flatten()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .map(String::from)
        .collect();
    ParsedRequest {
        prompt_text: parts.join("\n"),
        model: None,
        sampling,
        parse_error: None,
    }
}

/// `role: content` per turn, line feed between turns.
fn concat_messages(messages: &[Value]) -> String {
    messages
        .iter()
        .map(|message| {
            let role = message
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let content = message.get("content").map(content_text).unwrap_or_default();
            format!("{role}: {content}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Message content: a plain string, or an array of text parts.
fn content_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Completions `prompt`: a string or an array of strings.
fn prompt_field_text(prompt: &Value) -> String {
    match prompt {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn lift_sampling(json: &Value, keys: &[&str]) -> Map<String, Value> {
    let mut sampling = Map::new();
    for key in keys {
        if let Some(value) = json.get(*key) {
            sampling.insert((*key).to_string(), value.clone());
        }
    }
    sampling
}

fn openai_response_text(json: &Value) -> Option<String> {
    let choice = json.get("choices")?.as_array()?.first()?;
    if let Some(content) = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        return Some(content.to_string());
    }
    choice.get("text").and_then(Value::as_str).map(String::from)
}

fn openai_usage(json: &Value) -> Option<TokenUsage> {
    let usage = json.get("usage")?;
    Some(TokenUsage::new(
        u32_field(usage, "prompt_tokens")?,
        u32_field(usage, "completion_tokens").unwrap_or(0),
        u32_field(usage, "total_tokens")?,
    ))
}

fn anthropic_response_text(json: &Value) -> Option<String> {
    let blocks = json.get("content")?.as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        return None;
    }
    Some(text.join("\n"))
}

fn anthropic_usage(json: &Value) -> Option<TokenUsage> {
    let usage = json.get("usage")?;
    let input = u32_field(usage, "input_tokens")?;
    let output = u32_field(usage, "output_tokens").unwrap_or(0);
    Some(TokenUsage::new(input, output, input + output))
}

fn google_response_text(json: &Value) -> Option<String> {
    let candidate = json.get("candidates")?.as_array()?.first()?;
    let parts = candidate.get("content")?.get("parts")?.as_array()?;
    let text: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        return None;
    }
    Some(text.join("\n"))
}

fn google_usage(json: &Value) -> Option<TokenUsage> {
    let usage = json.get("usageMetadata")?;
    Some(TokenUsage::new(
        u32_field(usage, "promptTokenCount")?,
        u32_field(usage, "candidatesTokenCount").unwrap_or(0),
        u32_field(usage, "totalTokenCount")?,
    ))
}

fn u32_field(json: &Value, key: &str) -> Option<u32> {
    json.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

fn raw_fallback(body: &[u8]) -> String {
    let take = body.len().min(RAW_FALLBACK_MAX);
    String::from_utf8_lossy(&body[..take]).into_owned()
}
