//! Incremental index builds: scan → diff → parallel parse → serialized write.
//!
//! Parsing (read + tokenize + term counting) fans out over a rayon worker
//! pool; every store mutation happens on the calling thread, inside a single
//! transaction per run. That split keeps the `df` bookkeeping atomic without
//! any lock juggling: workers only ever touch read-only configuration.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::error::EngineError;
use crate::models::{IndexMode, IndexOptions, IndexSummary};
use crate::scanner::Scanner;
use crate::store::Store;
use crate::tokenizer::tokenize;

/// Progress callback: `(files_done, files_total, current_path)`.
///
/// Invoked from worker threads as files finish parsing; implementations must
/// tolerate concurrent calls.
pub type ProgressSink = dyn Fn(usize, usize, &str) + Sync;

/// Files handed to the worker pool per round. Bounds peak memory on big
/// trees while keeping the pool busy.
const BATCH_SIZE: usize = 2048;

struct WorkItem {
    rel: String,
    abs: PathBuf,
    mtime: f64,
    size: u64,
}

struct ParsedDoc {
    rel: String,
    mtime: f64,
    size: u64,
    length: u64,
    tf: HashMap<String, u64>,
}

enum WorkerOutcome {
    Parsed(ParsedDoc),
    /// Per-file read failure, returned as data; never aborts the run.
    Failed { rel: String, error: String },
    Cancelled,
}

/// Drives index runs against one store.
pub struct Indexer {
    store: Store,
    opts: IndexOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl Indexer {
    pub fn new(store: Store, opts: IndexOptions) -> Self {
        Self {
            store,
            opts,
            cancel: None,
        }
    }

    /// Install a cooperative cancellation flag. When set before commit the
    /// whole run rolls back and [`EngineError::Cancelled`] is returned.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Build or update the index for `root`.
    pub fn index(
        &mut self,
        root: &Path,
        mode: IndexMode,
        sink: Option<&ProgressSink>,
    ) -> Result<IndexSummary> {
        let root = root
            .canonicalize()
            .with_context(|| format!("cannot resolve index root {}", root.display()))?;
        log::info!("indexing {} ({:?})", root.display(), mode);

        self.store.begin()?;
        match self.run(&root, mode, sink) {
            Ok(mut summary) => {
                self.store.commit()?;
                let (n, sum_len) = self.store.globals()?;
                summary.total_docs = n;
                summary.avg_doc_len = sum_len as f64 / n.max(1) as f64;
                log::info!(
                    "index run done: {} indexed, {} unchanged, {} removed, {} failed, {} total",
                    summary.indexed,
                    summary.unchanged,
                    summary.removed,
                    summary.failed,
                    summary.total_docs
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(rb) = self.store.rollback() {
                    log::warn!("rollback after failed index run also failed: {}", rb);
                }
                Err(e)
            }
        }
    }

    /// Everything between `begin` and `commit`; an error here rolls the
    /// whole run back.
    fn run(
        &self,
        root: &Path,
        mode: IndexMode,
        sink: Option<&ProgressSink>,
    ) -> Result<IndexSummary> {
        let mut summary = IndexSummary::default();

        if mode == IndexMode::Full {
            log::info!("full rebuild: truncating store contents");
            self.store.truncate()?;
        }

        // Candidate set S, as root-relative paths.
        let candidates = Scanner::new(self.opts.scan.clone()).scan(root)?;
        let mut rels: Vec<(String, PathBuf)> = Vec::with_capacity(candidates.len());
        for abs in candidates {
            match abs.strip_prefix(root) {
                Ok(rel) => rels.push((rel.to_string_lossy().replace('\\', "/"), abs)),
                Err(_) => log::warn!("candidate escapes root, skipping: {}", abs.display()),
            }
        }
        log::info!("scan found {} candidate files", rels.len());

        // Deletions: indexed paths that no longer appear in the scan.
        let candidate_set: HashSet<&str> = rels.iter().map(|(rel, _)| rel.as_str()).collect();
        for (doc_id, path) in self.store.indexed_paths()? {
            if !candidate_set.contains(path.as_str()) {
                self.store.delete_document(doc_id)?;
                summary.removed += 1;
            }
        }

        // Change detection on the stored (mtime, size) pair.
        let mut queue: Vec<WorkItem> = Vec::new();
        for (rel, abs) in rels {
            let meta = match std::fs::metadata(&abs) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("cannot stat {}: {}", abs.display(), e);
                    summary.failed += 1;
                    continue;
                }
            };
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as f64)
                .unwrap_or(0.0);
            let size = meta.len();
            if mode == IndexMode::Incremental {
                if let Some(prior) = self.store.get_doc_meta(&rel)? {
                    if prior.mtime == mtime && prior.size == size {
                        summary.unchanged += 1;
                        continue;
                    }
                }
            }
            queue.push(WorkItem {
                rel,
                abs,
                mtime,
                size,
            });
        }
        log::info!(
            "plan: {} to parse, {} unchanged, {} removed",
            queue.len(),
            summary.unchanged,
            summary.removed
        );

        let workers = if self.opts.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.opts.workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("failed to build parsing thread pool")?;

        let total = queue.len();
        let done = AtomicUsize::new(0);
        let tokenizer = self.opts.tokenizer;
        let cancel = self.cancel.clone();

        for batch in queue.chunks(BATCH_SIZE) {
            if self.cancelled() {
                return Err(EngineError::Cancelled.into());
            }

            let outcomes: Vec<WorkerOutcome> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|item| {
                        if cancel
                            .as_ref()
                            .map(|f| f.load(Ordering::Relaxed))
                            .unwrap_or(false)
                        {
                            return WorkerOutcome::Cancelled;
                        }
                        let outcome = parse_file(item, &tokenizer);
                        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(sink) = sink {
                            sink(finished, total, &item.rel);
                        }
                        outcome
                    })
                    .collect()
            });

            // Single-writer drain: every mutation stays on this thread.
            for outcome in outcomes {
                match outcome {
                    WorkerOutcome::Parsed(doc) => {
                        let mut tf_by_id: HashMap<i64, u64> = HashMap::with_capacity(doc.tf.len());
                        for (term, tf) in &doc.tf {
                            tf_by_id.insert(self.store.intern_term(term)?, *tf);
                        }
                        let doc_id =
                            self.store
                                .upsert_document(&doc.rel, doc.mtime, doc.size, doc.length)?;
                        self.store.write_postings(doc_id, &tf_by_id)?;
                        summary.indexed += 1;
                    }
                    WorkerOutcome::Failed { rel, error } => {
                        log::warn!("skipping {}: {}", rel, error);
                        summary.failed += 1;
                    }
                    WorkerOutcome::Cancelled => {}
                }
            }
        }

        if self.cancelled() {
            return Err(EngineError::Cancelled.into());
        }

        self.store
            .set_indexed_root(&root.to_string_lossy())?;
        self.store.set_tokenizer_options(&self.opts.tokenizer)?;
        self.store
            .set_last_indexed_at(&chrono::Utc::now().to_rfc3339())?;
        Ok(summary)
    }
}

/// Worker body: read and tokenize one file. Pure with respect to the store.
fn parse_file(item: &WorkItem, tokenizer: &crate::tokenizer::TokenizerOptions) -> WorkerOutcome {
    let bytes = match std::fs::read(&item.abs) {
        Ok(b) => b,
        Err(e) => {
            return WorkerOutcome::Failed {
                rel: item.rel.clone(),
                error: e.to_string(),
            }
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    let tokens = tokenize(&text, tokenizer);
    let length = tokens.len() as u64;
    let mut tf: HashMap<String, u64> = HashMap::new();
    for token in tokens {
        *tf.entry(token).or_insert(0) += 1;
    }
    WorkerOutcome::Parsed(ParsedDoc {
        rel: item.rel.clone(),
        mtime: item.mtime,
        size: item.size,
        length,
        tf,
    })
}
