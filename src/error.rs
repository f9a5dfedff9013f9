//! Engine error kinds that callers need to tell apart.
//!
//! Most failures propagate as `anyhow::Error`; the variants here are the
//! ones the CLI maps to specific exit codes or user guidance. Per-file read
//! failures during indexing are not errors at all: they travel as data in
//! the index summary and never abort a run.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The store file cannot be opened or created.
    #[error("cannot open index store at {}: {detail}", .path.display())]
    StoreUnavailable { path: PathBuf, detail: String },

    /// Schema version mismatch or broken store contents.
    #[error("index store is not usable ({detail}); re-run `sx index --full` to rebuild")]
    StoreCorrupt { detail: String },

    /// Query-time tokenizer options differ from the ones the index was built
    /// with; silently mixing them would wreck recall.
    #[error(
        "index was built with {index} but the query requested {query}; \
         pass matching flags or rebuild the index"
    )]
    TokenizerMismatch { index: String, query: String },

    /// Cooperative cancellation observed before commit; the run was rolled back.
    #[error("indexing cancelled before commit")]
    Cancelled,
}
