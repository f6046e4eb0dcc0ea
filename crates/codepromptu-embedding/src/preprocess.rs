//! Content preprocessing ahead of embedding.

use codepromptu_types::limits::MAX_EMBED_CHARS;

/// Preprocessed text plus a marker for whether truncation happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessed {
    /// Trimmed, newline-normalized, length-bounded text.
    pub text: String,
    /// True when the input exceeded the character cap.
    pub truncated: bool,
}

/// Trim, collapse CRLF/CR to LF, and truncate to `MAX_EMBED_CHARS`.
///
/// Truncation counts characters, not bytes, so the boundary behaviour is
/// exact: input of the cap length passes through unchanged, one char over
/// loses exactly one char.
#[must_use]
pub fn preprocess(text: &str) -> Preprocessed {
    preprocess_with_cap(text, MAX_EMBED_CHARS)
}

/// `preprocess` with an explicit cap.
#[must_use]
pub fn preprocess_with_cap(text: &str, max_chars: usize) -> Preprocessed {
    let normalized = text.trim().replace("\r\n", "\n").replace('\r', "\n");
    let char_count = normalized.chars().count();
    if char_count <= max_chars {
        return Preprocessed {
            text: normalized,
            truncated: false,
        };
    }
    let text = normalized.chars().take(max_chars).collect::<String>();
    Preprocessed {
        text,
        truncated: true,
    }
}
