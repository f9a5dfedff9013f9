//! Core data models for sx.
//!
//! Value types shared across the engine: option bags for indexing and
//! search, ranked hits, run summaries, and the JSON record shape emitted by
//! the CLI shell.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::scanner::ScanConfig;
use crate::tokenizer::TokenizerOptions;

/// Stored metadata for one indexed document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocMeta {
    pub doc_id: i64,
    /// Filesystem modification time, seconds since the epoch.
    pub mtime: f64,
    /// File size in bytes.
    pub size: u64,
    /// Token count after tokenization; zero for empty or all-stopword files.
    pub length: u64,
}

/// How an index run treats existing store contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Truncate all content tables and reindex everything.
    Full,
    /// Reindex only files whose `(mtime, size)` differs from the store.
    Incremental,
}

/// Configuration for an index run.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub scan: ScanConfig,
    pub tokenizer: TokenizerOptions,
    /// Parsing worker threads; 0 means the host CPU count.
    pub workers: usize,
}

/// Counters reported at the end of an index run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexSummary {
    /// Documents parsed and written this run.
    pub indexed: usize,
    /// Candidates skipped because `(mtime, size)` matched the store.
    pub unchanged: usize,
    /// Documents removed because their file disappeared from the scan.
    pub removed: usize,
    /// Per-file read failures (logged and skipped, never fatal).
    pub failed: usize,
    /// Total documents in the store after commit.
    pub total_docs: u64,
    /// Average document length after commit.
    pub avg_doc_len: f64,
}

/// Knobs for one search invocation.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of hits returned.
    pub k: usize,
    /// BM25 term-frequency saturation.
    pub k1: f64,
    /// BM25 length-normalization strength.
    pub b: f64,
    /// Multiplier applied per query term found among the path's tokens.
    pub path_boost: f64,
    /// Only documents whose path contains this substring.
    pub path_filter: Option<String>,
    /// Only documents whose extension or basename is in this set.
    pub ext_filter: Option<HashSet<String>>,
    /// Must match the options persisted in the store.
    pub tokenizer: TokenizerOptions,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            k: 10,
            k1: 1.2,
            b: 0.75,
            path_boost: 1.5,
            path_filter: None,
            ext_filter: None,
            tokenizer: TokenizerOptions::default(),
        }
    }
}

/// Whether a search ran against a populated index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Ok,
    /// The store exists but holds no documents; hits are always empty.
    EmptyIndex,
}

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub doc_id: i64,
    pub score: f64,
    /// Path relative to the indexed root.
    pub path: String,
    /// Query terms that matched in this document's body, in query order.
    pub matched_terms: Vec<String>,
}

/// The full result of a search call.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// Absolute root the index was built from.
    pub root: String,
    pub status: SearchStatus,
    pub hits: Vec<SearchHit>,
}

/// JSON record emitted per hit by the CLI (`--json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonHit {
    pub path: String,
    pub score: f64,
    pub line: Option<usize>,
    pub snippet: Option<String>,
    pub terms: Vec<String>,
}
