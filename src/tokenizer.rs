//! Text tokenization: identifier splitting, stopwords, light stemming.
//!
//! The tokenizer is a pure function over its options, and the same pipeline
//! runs at index time and at query time. Each raw `[A-Za-z0-9_]` run emits
//! the lowercased whole token plus the sub-tokens produced by identifier
//! splitting, so `parseHTTPRequest` is findable as `parsehttprequest`,
//! `parse`, `http`, and `request`.

use serde::{Deserialize, Serialize};

use crate::stopwords::is_stopword;

/// Options that change what the tokenizer emits.
///
/// These are persisted in the index store and must match between index and
/// query time; see [`crate::store::Store::tokenizer_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerOptions {
    /// Apply the light suffix stemmer to every emitted token.
    pub stem: bool,
    /// Subtract the built-in English stopword set.
    pub stopwords: bool,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            stem: false,
            stopwords: true,
        }
    }
}

impl std::fmt::Display for TokenizerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stem={}, stopwords={}", self.stem, self.stopwords)
    }
}

/// Tokenize `text` into an ordered sequence of normalized terms.
pub fn tokenize(text: &str, opts: &TokenizerOptions) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|s| !s.is_empty())
    {
        let whole = raw.to_ascii_lowercase();
        emit(&mut out, whole.clone(), opts);
        for part in split_identifier(raw) {
            let lowered = part.to_ascii_lowercase();
            // A sub-token identical to the whole token would be a duplicate.
            if lowered != whole {
                emit(&mut out, lowered, opts);
            }
        }
    }
    out
}

fn emit(out: &mut Vec<String>, token: String, opts: &TokenizerOptions) {
    if token.is_empty() {
        return;
    }
    if opts.stopwords && is_stopword(&token) {
        return;
    }
    let token = if opts.stem {
        stem(&token).to_string()
    } else {
        token
    };
    out.push(token);
}

/// Split an identifier at underscores, case boundaries, and digit boundaries.
///
/// Boundaries: lowercase→uppercase, an uppercase run followed by lowercase
/// (`HTTPServer` → `HTTP`, `Server`), and letter↔digit in either direction.
fn split_identifier(token: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    for piece in token.split('_').filter(|p| !p.is_empty()) {
        let bytes = piece.as_bytes();
        let mut start = 0;
        for i in 1..bytes.len() {
            let prev = bytes[i - 1];
            let cur = bytes[i];
            let boundary = (prev.is_ascii_lowercase() && cur.is_ascii_uppercase())
                || (prev.is_ascii_uppercase()
                    && cur.is_ascii_uppercase()
                    && bytes.get(i + 1).is_some_and(|n| n.is_ascii_lowercase()))
                || (prev.is_ascii_digit() && cur.is_ascii_alphabetic())
                || (prev.is_ascii_alphabetic() && cur.is_ascii_digit());
            if boundary {
                parts.push(&piece[start..i]);
                start = i;
            }
        }
        parts.push(&piece[start..]);
    }
    parts
}

/// Deterministic light stemmer: strip the first of `-ing`, `-ed`, `-es`,
/// `-s` whose removal leaves at least 3 characters.
fn stem(token: &str) -> &str {
    for suffix in ["ing", "ed", "es", "s"] {
        if let Some(rest) = token.strip_suffix(suffix) {
            if rest.len() >= 3 {
                return rest;
            }
        }
    }
    token
}
