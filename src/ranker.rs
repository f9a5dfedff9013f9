//! BM25 scoring over posting lists, with path-token boosting and bounded
//! top-k selection.
//!
//! Scores accumulate per document across the query's effective term set;
//! path and extension filters are applied the first time a document is
//! touched, and a size-bounded min-heap keeps only the k best candidates.
//! Ties break by ascending path so results are deterministic.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::Path;

use anyhow::Result;

use crate::error::EngineError;
use crate::models::{SearchHit, SearchOptions, SearchResponse, SearchStatus};
use crate::planner::plan;
use crate::store::Store;
use crate::tokenizer::tokenize;

/// The BM25+1 inverse document frequency: `ln((N - df + 0.5)/(df + 0.5) + 1)`.
/// Always positive, even for terms present in every document.
pub fn bm25_idf(n_docs: u64, df: u64) -> f64 {
    (((n_docs as f64 - df as f64 + 0.5) / (df as f64 + 0.5)) + 1.0).ln()
}

/// Per-document accumulator, created when a posting first touches the doc.
struct DocState {
    path: String,
    length: u64,
    path_tokens: Vec<String>,
    score: f64,
    matched: Vec<String>,
}

/// A candidate in the top-k heap. Natural ordering is "worse first": lower
/// score, then lexicographically later path.
struct HeapEntry {
    score: f64,
    doc_id: i64,
    path: String,
    matched: Vec<String>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.path == other.path
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.path.cmp(&self.path))
    }
}

/// Rank documents for `query` against an opened store.
pub fn search(store: &Store, query: &str, opts: &SearchOptions) -> Result<SearchResponse> {
    let root = store.indexed_root()?.unwrap_or_else(|| ".".to_string());
    let (n_docs, sum_len) = store.globals()?;
    if n_docs == 0 {
        return Ok(SearchResponse {
            root,
            status: SearchStatus::EmptyIndex,
            hits: Vec::new(),
        });
    }

    // The query must tokenize exactly like the index did.
    let stored = store.tokenizer_options()?.unwrap_or_default();
    if stored != opts.tokenizer {
        return Err(EngineError::TokenizerMismatch {
            index: stored.to_string(),
            query: opts.tokenizer.to_string(),
        }
        .into());
    }

    let plan = plan(query, &opts.tokenizer, store)?;
    if plan.is_empty() || opts.k == 0 {
        return Ok(SearchResponse {
            root,
            status: SearchStatus::Ok,
            hits: Vec::new(),
        });
    }

    let avgdl = sum_len as f64 / n_docs.max(1) as f64;
    let mut docs: HashMap<i64, DocState> = HashMap::new();
    let mut rejected: HashSet<i64> = HashSet::new();

    for planned in &plan.terms {
        let idf = bm25_idf(n_docs, planned.df);
        for (doc_id, tf) in store.iter_postings(planned.term_id)? {
            if rejected.contains(&doc_id) {
                continue;
            }
            if !docs.contains_key(&doc_id) {
                let Some((path, length)) = store.get_doc(doc_id)? else {
                    continue;
                };
                if !passes_filters(&path, opts) {
                    rejected.insert(doc_id);
                    continue;
                }
                let path_tokens = tokenize(&path, &opts.tokenizer);
                docs.insert(
                    doc_id,
                    DocState {
                        path,
                        length,
                        path_tokens,
                        score: 0.0,
                        matched: Vec::new(),
                    },
                );
            }
            let Some(state) = docs.get_mut(&doc_id) else {
                continue;
            };

            let dl = state.length.max(1) as f64;
            let tf = tf as f64;
            let denom = tf + opts.k1 * (1.0 - opts.b + opts.b * dl / avgdl);
            let mut score = idf * (tf * (opts.k1 + 1.0)) / denom;
            if state
                .path_tokens
                .iter()
                .any(|t| t.contains(planned.term.as_str()))
            {
                score *= opts.path_boost;
            }
            state.score += score;
            state.matched.push(planned.term.clone());
        }
    }

    // Bounded top-k selection: a min-heap of the k best seen so far.
    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::with_capacity(opts.k + 1);
    for (doc_id, state) in docs {
        let entry = HeapEntry {
            score: state.score,
            doc_id,
            path: state.path,
            matched: state.matched,
        };
        if heap.len() < opts.k {
            heap.push(Reverse(entry));
        } else if let Some(worst) = heap.peek() {
            if entry > worst.0 {
                heap.pop();
                heap.push(Reverse(entry));
            }
        }
    }

    let hits = heap
        .into_sorted_vec()
        .into_iter()
        .map(|Reverse(entry)| SearchHit {
            doc_id: entry.doc_id,
            score: entry.score,
            path: entry.path,
            matched_terms: entry.matched,
        })
        .collect();

    Ok(SearchResponse {
        root,
        status: SearchStatus::Ok,
        hits,
    })
}

/// Path and extension filters, checked once per document on first touch.
fn passes_filters(path: &str, opts: &SearchOptions) -> bool {
    if let Some(filter) = &opts.path_filter {
        if !path.contains(filter.as_str()) {
            return false;
        }
    }
    if let Some(allowed) = &opts.ext_filter {
        let p = Path::new(path);
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let by_ext = p
            .extension()
            .map(|e| allowed.contains(&format!(".{}", e.to_string_lossy().to_lowercase())))
            .unwrap_or(false);
        if !allowed.contains(&name) && !by_ext {
            return false;
        }
    }
    true
}
