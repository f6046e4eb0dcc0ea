//! Provider detection: classify an inbound call and produce its egress
//! configuration.
//!
//! Pure functions over the request line and headers; no global state.
//! New providers are added by extending the pattern table in `detect`.

use axum::http::HeaderMap;

use codepromptu_types::Provider;

/// Minimum accepted credential length.
const CREDENTIAL_MIN_LEN: usize = 4;

/// Maximum accepted credential length.
const CREDENTIAL_MAX_LEN: usize = 1024;

/// Anthropic egress requires a version header; added when absent.
pub const ANTHROPIC_VERSION_HEADER: (&str, &str) = ("anthropic-version", "2023-06-01");

/// Which timeout class an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Chat/completion style call (long timeout).
    Chat,
    /// Embeddings call (short timeout).
    Embeddings,
}

/// Per-provider target base URLs; overridable for tests and private routing.
#[derive(Debug, Clone)]
pub struct ProviderBases {
    /// OpenAI API base.
    pub openai: String,
    /// Anthropic API base.
    pub anthropic: String,
    /// Google Generative Language API base.
    pub google_ai: String,
}

impl Default for ProviderBases {
    fn default() -> Self {
        ProviderBases {
            openai: "https://api.openai.com".to_string(),
            anthropic: "https://api.anthropic.com".to_string(),
            google_ai: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

impl ProviderBases {
    /// Base URL for `provider`, without a trailing slash.
    #[must_use]
    pub fn base_for(&self, provider: Provider) -> &str {
        let base = match provider {
            Provider::Openai => &self.openai,
            Provider::Anthropic => &self.anthropic,
            Provider::GoogleAi => &self.google_ai,
        };
        base.trim_end_matches('/')
    }
}

/// Egress configuration for one classified request.
#[derive(Debug, Clone)]
pub struct ProviderRoute {
    /// Detected provider.
    pub provider: Provider,
    /// Target base URL the original path is appended to.
    pub target_base: String,
    /// Name of the header carrying the credential on egress.
    pub auth_header_name: &'static str,
    /// Ancillary headers required by the provider, added when absent.
    pub extra_headers: Vec<(&'static str, &'static str)>,
    /// The client credential, forwarded verbatim.
    pub credential: String,
    /// Model extracted from the path (GOOGLE_AI), when present.
    pub model_hint: Option<String>,
    /// Timeout class of the endpoint.
    pub endpoint_kind: EndpointKind,
}

/// Outcome of provider detection.
#[derive(Debug, Clone)]
pub enum Detection {
    /// Path and credential both matched.
    Known(ProviderRoute),
    /// Path matched a provider but the credential is missing or malformed.
    MissingCredential(Provider),
    /// No provider pattern matched.
    Unknown,
}

/// Classify a request by path and credential location.
///
/// A request maps to a provider only when BOTH the path matches and a
/// format-valid credential sits in that provider's location. Header lookup
/// is case-insensitive throughout (the `HeaderMap` contract); the GOOGLE_AI
/// `key` query parameter is parsed from `query` case-sensitively, as query
/// keys are.
#[must_use]
pub fn detect(
    path: &str,
    headers: &HeaderMap,
    query: Option<&str>,
    bases: &ProviderBases,
) -> Detection {
    if let Some(kind) = openai_endpoint(path) {
        return match bearer_credential(headers) {
            Some(credential) => Detection::Known(ProviderRoute {
                provider: Provider::Openai,
                target_base: bases.base_for(Provider::Openai).to_string(),
                auth_header_name: "authorization",
                extra_headers: Vec::new(),
                credential,
                model_hint: None,
                endpoint_kind: kind,
            }),
            None => Detection::MissingCredential(Provider::Openai),
        };
    }
    if anthropic_endpoint(path) {
        return match bearer_credential(headers) {
            Some(credential) => Detection::Known(ProviderRoute {
                provider: Provider::Anthropic,
                target_base: bases.base_for(Provider::Anthropic).to_string(),
                auth_header_name: "authorization",
                extra_headers: vec![ANTHROPIC_VERSION_HEADER],
                credential,
                model_hint: None,
                endpoint_kind: EndpointKind::Chat,
            }),
            None => Detection::MissingCredential(Provider::Anthropic),
        };
    }
    if let Some(model) = google_model(path) {
        let credential = header_credential(headers, "x-goog-api-key")
            .or_else(|| query_key(query.unwrap_or_default()));
        return match credential {
            Some(credential) => Detection::Known(ProviderRoute {
                provider: Provider::GoogleAi,
                target_base: bases.base_for(Provider::GoogleAi).to_string(),
                auth_header_name: "x-goog-api-key",
                extra_headers: Vec::new(),
                credential,
                model_hint: Some(model),
                endpoint_kind: EndpointKind::Chat,
            }),
            None => Detection::MissingCredential(Provider::GoogleAi),
        };
    }
    Detection::Unknown
}

/// Whether an unmatched path still looks like an LLM API call; such
/// requests get a provider-shaped rejection instead of default routing.
#[must_use]
pub fn is_llm_like(path: &str) -> bool {
    path.contains("/chat/completions")
        || path.contains("/completions")
        || path.contains("/complete")
        || path.contains("/messages")
        || path.contains("/embeddings")
        || path.contains("generateContent")
        || path.contains("/models/")
}

/// Structural credential check: length bounds and printable ASCII without
/// whitespace. Real validation is the provider's job.
#[must_use]
pub fn credential_format_valid(credential: &str) -> bool {
    let len = credential.len();
    if !(CREDENTIAL_MIN_LEN..=CREDENTIAL_MAX_LEN).contains(&len) {
        return false;
    }
    credential
        .bytes()
        .all(|b| (0x21..=0x7e).contains(&b))
}

fn openai_endpoint(path: &str) -> Option<EndpointKind> {
    match path {
        "/v1/chat/completions" | "/v1/completions" => Some(EndpointKind::Chat),
        "/v1/embeddings" => Some(EndpointKind::Embeddings),
        _ => None,
    }
}

fn anthropic_endpoint(path: &str) -> bool {
    path == "/v1/messages" || path == "/v1/complete"
}

/// `/v1beta/models/{model}/generateContent` (and the `:generateContent`
/// spelling); yields the model segment.
fn google_model(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/v1beta/models/")?;
    let model = rest
        .strip_suffix("/generateContent")
        .or_else(|| rest.strip_suffix(":generateContent"))?;
    if model.is_empty() || model.contains('/') {
        return None;
    }
    Some(model.to_string())
}

/// `Authorization: Bearer <key>`, case-insensitive on both the header name
/// and the scheme.
fn bearer_credential(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let (scheme, key) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let key = key.trim();
    credential_format_valid(key).then(|| key.to_string())
}

fn header_credential(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    credential_format_valid(value).then(|| value.to_string())
}

/// First `key=` parameter of the raw query string.
fn query_key(query: &str) -> Option<String> {
    for pair in query.split('&') {
        let (name, value) = pair.split_once('=')?;
        if name == "key" {
            let value = value.trim();
            return credential_format_valid(value).then(|| value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).expect("header value"));
        headers
    }

    #[test]
    fn openai_chat_with_bearer_is_known() {
        let headers = headers_with("authorization", "Bearer sk-abc");
        let detection = detect("/v1/chat/completions", &headers, None, &ProviderBases::default());
        match detection {
            Detection::Known(route) => {
                assert_eq!(route.provider, Provider::Openai);
                assert_eq!(route.credential, "sk-abc");
                assert_eq!(route.endpoint_kind, EndpointKind::Chat);
            }
            other => panic!("expected Known, got {other:?}"),
        }
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        // HeaderMap normalizes names; a lowercase insert matches the same way.
        let headers = headers_with("authorization", "bearer sk-xyz");
        let detection = detect("/v1/chat/completions", &headers, None, &ProviderBases::default());
        assert!(matches!(detection, Detection::Known(route) if route.credential == "sk-xyz"));
    }

    #[test]
    fn anthropic_complete_is_not_shadowed_by_completions() {
        let headers = headers_with("authorization", "Bearer sk-ant-key");
        let detection = detect("/v1/complete", &headers, None, &ProviderBases::default());
        assert!(matches!(
            detection,
            Detection::Known(route) if route.provider == Provider::Anthropic
        ));
    }

    #[test]
    fn google_credential_from_query_key() {
        let headers = HeaderMap::new();
        let detection = detect(
            "/v1beta/models/gemini-pro/generateContent",
            &headers,
            Some("key=goog-key-123"),
            &ProviderBases::default(),
        );
        match detection {
            Detection::Known(route) => {
                assert_eq!(route.provider, Provider::GoogleAi);
                assert_eq!(route.model_hint.as_deref(), Some("gemini-pro"));
            }
            other => panic!("expected Known, got {other:?}"),
        }
    }

    #[test]
    fn google_colon_spelling_is_accepted() {
        let headers = headers_with("x-goog-api-key", "goog-key-123");
        let detection = detect(
            "/v1beta/models/gemini-pro:generateContent",
            &headers,
            None,
            &ProviderBases::default(),
        );
        assert!(matches!(detection, Detection::Known(_)));
    }

    #[test]
    fn recognized_path_without_credential_is_missing() {
        let detection = detect(
            "/v1/messages",
            &HeaderMap::new(),
            None,
            &ProviderBases::default(),
        );
        assert!(matches!(
            detection,
            Detection::MissingCredential(Provider::Anthropic)
        ));
    }

    #[test]
    fn malformed_credential_is_missing() {
        let headers = headers_with("authorization", "Bearer a b");
        let detection = detect("/v1/chat/completions", &headers, None, &ProviderBases::default());
        assert!(matches!(detection, Detection::MissingCredential(_)));

        let headers = headers_with("authorization", "Bearer ab");
        let detection = detect("/v1/chat/completions", &headers, None, &ProviderBases::default());
        assert!(matches!(detection, Detection::MissingCredential(_)));
    }

    #[test]
    fn unmatched_path_is_unknown() {
        let detection = detect(
            "/v2/other",
            &HeaderMap::new(),
            None,
            &ProviderBases::default(),
        );
        assert!(matches!(detection, Detection::Unknown));
    }

    #[test]
    fn llm_like_paths_are_flagged() {
        assert!(is_llm_like("/openai/v1/chat/completions"));
        assert!(is_llm_like("/api/generateContent"));
        assert!(!is_llm_like("/healthz"));
    }
}
