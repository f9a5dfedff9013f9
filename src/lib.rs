//! sx: local BM25 full-text search for source and documentation trees.
//!
//! Point it at a directory and it maintains a persistent inverted index in a
//! single SQLite file, answering ranked keyword queries in well under a
//! second on repositories of tens of thousands of files.
//!
//! # Architecture
//!
//! - **Scanner**: walks the tree, applies include rules and a binary sniff
//! - **Indexer**: incremental update (mtime/size diff), parallel parsing,
//!   one serialized writer inside a single transaction
//! - **Store**: SQLite schema for documents, terms, and postings
//! - **Planner/Ranker**: `|` alternation with regex expansion over the terms
//!   table, BM25 scoring with path-token boosting
//! - **Snippet**: best-matching line with term spans, for the CLI shell
//!
//! # Example Usage
//!
//! ```no_run
//! use sx::{Indexer, IndexMode, IndexOptions, SearchOptions, Store};
//!
//! let store = Store::open("bm25.sqlite".as_ref()).unwrap();
//! let mut indexer = Indexer::new(store, IndexOptions::default());
//! indexer.index(".".as_ref(), IndexMode::Incremental, None).unwrap();
//!
//! let store = Store::open("bm25.sqlite".as_ref()).unwrap();
//! let resp = sx::search(&store, "cluster slots", &SearchOptions::default()).unwrap();
//! for hit in resp.hits {
//!     println!("{:8.4}  {}", hit.score, hit.path);
//! }
//! ```

pub mod cli;
pub mod error;
pub mod indexer;
pub mod models;
pub mod output;
pub mod planner;
pub mod ranker;
pub mod scanner;
pub mod snippet;
pub mod stopwords;
pub mod store;
pub mod tokenizer;

// Re-export commonly used types
pub use error::EngineError;
pub use indexer::{Indexer, ProgressSink};
pub use models::{
    IndexMode, IndexOptions, IndexSummary, SearchHit, SearchOptions, SearchResponse, SearchStatus,
};
pub use ranker::search;
pub use scanner::{ScanConfig, Scanner};
pub use store::Store;
pub use tokenizer::{tokenize, TokenizerOptions};
