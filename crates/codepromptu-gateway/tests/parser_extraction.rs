#![allow(missing_docs)]

use codepromptu_gateway::{parse_request, parse_response};
use codepromptu_types::{Provider, TokenUsage};

#[test]
fn openai_chat_concatenates_role_prefixed_turns() {
    let body = br#"{
        "model": "gpt-4",
        "temperature": 0.2,
        "max_tokens": 100,
        "messages": [
            {"role": "system", "content": "be terse"},
            {"role": "user", "content": "ping"}
        ]
    }"#;
    let parsed = parse_request(Provider::Openai, body);
    assert_eq!(parsed.prompt_text, "system: be terse\nuser: ping");
    assert_eq!(parsed.model.as_deref(), Some("gpt-4"));
    assert_eq!(parsed.sampling.get("temperature"), Some(&serde_json::json!(0.2)));
    assert_eq!(parsed.sampling.get("max_tokens"), Some(&serde_json::json!(100)));
    assert!(parsed.parse_error.is_none());
}

#[test]
fn openai_chat_handles_content_parts() {
    let body = br#"{
        "model": "gpt-4",
        "messages": [
            {"role": "user", "content": [{"type": "text", "text": "part one"}, {"type": "text", "text": "part two"}]}
        ]
    }"#;
    let parsed = parse_request(Provider::Openai, body);
    assert_eq!(parsed.prompt_text, "user: part one\npart two");
}

#[test]
fn openai_completions_takes_prompt_directly() {
    let body = br#"{"model": "gpt-3.5-turbo-instruct", "prompt": "complete me"}"#;
    let parsed = parse_request(Provider::Openai, body);
    assert_eq!(parsed.prompt_text, "complete me");

    let body = br#"{"prompt": ["first", "second"]}"#;
    let parsed = parse_request(Provider::Openai, body);
    assert_eq!(parsed.prompt_text, "first\nsecond");
}

#[test]
fn anthropic_messages_include_system_prefix() {
    let body = br#"{
        "model": "claude-3-opus",
        "system": "you are helpful",
        "max_tokens": 512,
        "messages": [{"role": "user", "content": "hello"}]
    }"#;
    let parsed = parse_request(Provider::Anthropic, body);
    assert_eq!(parsed.prompt_text, "system: you are helpful\nuser: hello");
    assert_eq!(parsed.model.as_deref(), Some("claude-3-opus"));
    assert_eq!(parsed.sampling.get("max_tokens"), Some(&serde_json::json!(512)));
}

#[test]
fn google_contents_parts_are_joined() {
    let body = br#"{
        "contents": [
            {"parts": [{"text": "alpha"}, {"text": "beta"}]},
            {"parts": [{"text": "gamma"}]}
        ],
        "generationConfig": {"temperature": 0.9, "maxOutputTokens": 64}
    }"#;
    let parsed = parse_request(Provider::GoogleAi, body);
    assert_eq!(parsed.prompt_text, "alpha\nbeta\ngamma");
    assert!(parsed.model.is_none());
    assert_eq!(parsed.sampling.get("temperature"), Some(&serde_json::json!(0.9)));
}

#[test]
fn malformed_json_never_fails_the_parse() {
    let body = b"this is not json {";
    let parsed = parse_request(Provider::Openai, body);
    assert!(parsed.parse_error.is_some());
    assert_eq!(parsed.prompt_text, "this is not json {");
    assert!(parsed.model.is_none());
}

#[test]
fn partial_extraction_keeps_what_is_available() {
    // Messages present, model missing: text still extracted.
    let body = br#"{"messages": [{"role": "user", "content": "no model here"}]}"#;
    let parsed = parse_request(Provider::Openai, body);
    assert_eq!(parsed.prompt_text, "user: no model here");
    assert!(parsed.model.is_none());
    assert!(parsed.parse_error.is_none());
}

#[test]
fn openai_response_text_and_usage() {
    let body = br#"{
        "id": "x",
        "model": "gpt-4",
        "choices": [{"message": {"role": "assistant", "content": "pong"}}],
        "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
    }"#;
    let parsed = parse_response(Provider::Openai, body);
    assert_eq!(parsed.response_text.as_deref(), Some("pong"));
    assert_eq!(parsed.model.as_deref(), Some("gpt-4"));
    assert_eq!(parsed.token_usage, Some(TokenUsage::new(1, 1, 2)));
}

#[test]
fn response_without_usage_leaves_tokens_null() {
    let body = br#"{"choices": [{"text": "legacy completion"}]}"#;
    let parsed = parse_response(Provider::Openai, body);
    assert_eq!(parsed.response_text.as_deref(), Some("legacy completion"));
    assert!(parsed.token_usage.is_none());
}

#[test]
fn anthropic_response_sums_input_and_output_tokens() {
    let body = br#"{
        "content": [{"type": "text", "text": "hi"}, {"type": "text", "text": "there"}],
        "usage": {"input_tokens": 10, "output_tokens": 5}
    }"#;
    let parsed = parse_response(Provider::Anthropic, body);
    assert_eq!(parsed.response_text.as_deref(), Some("hi\nthere"));
    assert_eq!(parsed.token_usage, Some(TokenUsage::new(10, 5, 15)));
}

#[test]
fn google_response_candidates_and_usage_metadata() {
    let body = br#"{
        "candidates": [{"content": {"parts": [{"text": "answer"}]}}],
        "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3, "totalTokenCount": 10}
    }"#;
    let parsed = parse_response(Provider::GoogleAi, body);
    assert_eq!(parsed.response_text.as_deref(), Some("answer"));
    assert_eq!(parsed.token_usage, Some(TokenUsage::new(7, 3, 10)));
}

#[test]
fn malformed_response_records_error_only() {
    let parsed = parse_response(Provider::Anthropic, b"<html>bad gateway</html>");
    assert!(parsed.parse_error.is_some());
    assert!(parsed.response_text.is_none());
    assert!(parsed.token_usage.is_none());
}
