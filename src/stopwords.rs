//! Built-in English stopword list.
//!
//! The set is fixed; it is subtracted from token streams after lowercasing
//! when stopword filtering is enabled (the default). Keep the slice sorted:
//! lookup is a binary search.

/// Common English words excluded from the index and from queries.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from",
    "has", "have", "he", "her", "his", "i", "if", "in", "into", "is", "it",
    "its", "me", "not", "of", "on", "or", "our", "s", "she", "so", "t",
    "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "to", "was", "we", "were", "what", "when", "where", "which", "who",
    "will", "with", "you", "your",
];

/// Check whether a lowercased token is a stopword.
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}
