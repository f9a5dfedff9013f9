//! Persistent inverted-index store backed by SQLite.
//!
//! One self-contained database file holds four tables: `meta` (singletons:
//! schema version, indexed root, document count, summed lengths, tokenizer
//! options), `docs`, `terms`, and `postings`. The store owns all persistent
//! entities; the indexer wraps a full run in one transaction via
//! [`Store::begin`] / [`Store::commit`], so readers observe either the
//! pre-run or post-run state, never a partial one.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::EngineError;
use crate::models::DocMeta;
use crate::tokenizer::TokenizerOptions;

/// Default basename of the on-disk store.
pub const DEFAULT_STORE_BASENAME: &str = "bm25.sqlite";

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS docs (
  doc_id INTEGER PRIMARY KEY,
  path TEXT NOT NULL UNIQUE,
  mtime REAL NOT NULL,
  size INTEGER NOT NULL,
  length INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS terms (
  term_id INTEGER PRIMARY KEY,
  term TEXT NOT NULL UNIQUE,
  df INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS postings (
  term_id INTEGER NOT NULL,
  doc_id INTEGER NOT NULL,
  tf INTEGER NOT NULL,
  PRIMARY KEY (term_id, doc_id)
);
CREATE INDEX IF NOT EXISTS idx_postings_doc ON postings(doc_id);
";

/// Handle to the on-disk index.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open or create the store at `path`.
    ///
    /// A store written by an incompatible schema version is refused with
    /// [`EngineError::StoreCorrupt`]; a full rebuild recreates it.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| EngineError::StoreUnavailable {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|e| EngineError::StoreUnavailable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

        conn.execute_batch(
            "PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;
             PRAGMA temp_store=MEMORY;",
        )
        .context("failed to configure store connection")?;
        // WAL is unsupported on some filesystems; fall back silently.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;");

        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.init_schema()?;
        store.check_version()?;
        Ok(store)
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("failed to create store schema")?;
        if self.get_meta("schema_version")?.is_none() {
            self.set_meta("schema_version", &SCHEMA_VERSION.to_string())?;
            self.set_meta("doc_count", "0")?;
            self.set_meta("sum_len", "0")?;
            log::debug!("initialized store schema v{}", SCHEMA_VERSION);
        }
        Ok(())
    }

    fn check_version(&self) -> Result<()> {
        let version: i64 = self
            .get_meta("schema_version")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if version != SCHEMA_VERSION {
            return Err(EngineError::StoreCorrupt {
                detail: format!("schema version {} (expected {})", version, SCHEMA_VERSION),
            }
            .into());
        }
        Ok(())
    }

    // ---- meta singletons ----

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            [key, value],
        )?;
        Ok(())
    }

    /// Total document count and summed document lengths `(N, Σℓ)`.
    pub fn globals(&self) -> Result<(u64, u64)> {
        let n = self
            .get_meta("doc_count")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let sum_len = self
            .get_meta("sum_len")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok((n, sum_len))
    }

    fn bump_globals(&self, docs_delta: i64, len_delta: i64) -> Result<()> {
        let (n, sum_len) = self.globals()?;
        self.set_meta("doc_count", &(n as i64 + docs_delta).max(0).to_string())?;
        self.set_meta("sum_len", &(sum_len as i64 + len_delta).max(0).to_string())?;
        Ok(())
    }

    /// Absolute root of the tree at the last successful index, if any.
    pub fn indexed_root(&self) -> Result<Option<String>> {
        self.get_meta("indexed_root")
    }

    pub fn set_indexed_root(&self, root: &str) -> Result<()> {
        self.set_meta("indexed_root", root)
    }

    /// RFC 3339 timestamp of the last committed index run, if any.
    pub fn last_indexed_at(&self) -> Result<Option<String>> {
        self.get_meta("last_indexed_at")
    }

    pub fn set_last_indexed_at(&self, stamp: &str) -> Result<()> {
        self.set_meta("last_indexed_at", stamp)
    }

    /// Tokenizer options the index was built with; `None` before any run.
    pub fn tokenizer_options(&self) -> Result<Option<TokenizerOptions>> {
        let stem = self.get_meta("stem")?;
        let stopwords = self.get_meta("stopwords")?;
        match (stem, stopwords) {
            (Some(stem), Some(stopwords)) => Ok(Some(TokenizerOptions {
                stem: stem == "true",
                stopwords: stopwords == "true",
            })),
            _ => Ok(None),
        }
    }

    pub fn set_tokenizer_options(&self, opts: &TokenizerOptions) -> Result<()> {
        self.set_meta("stem", if opts.stem { "true" } else { "false" })?;
        self.set_meta("stopwords", if opts.stopwords { "true" } else { "false" })
    }

    // ---- transactions ----

    pub fn begin(&self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .context("failed to begin store transaction")
    }

    pub fn commit(&self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("failed to commit store transaction")
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .context("failed to roll back store transaction")
    }

    // ---- documents ----

    /// Stored metadata for a path, or `None` if the path is not indexed.
    pub fn get_doc_meta(&self, path: &str) -> Result<Option<DocMeta>> {
        let meta = self
            .conn
            .query_row(
                "SELECT doc_id, mtime, size, length FROM docs WHERE path = ?1",
                [path],
                |row| {
                    Ok(DocMeta {
                        doc_id: row.get(0)?,
                        mtime: row.get(1)?,
                        size: row.get::<_, i64>(2)? as u64,
                        length: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    /// Insert or update a document row; returns its `doc_id`.
    ///
    /// Maintains `N` and `Σℓ`. Postings are handled separately by
    /// [`Store::write_postings`].
    pub fn upsert_document(&self, path: &str, mtime: f64, size: u64, length: u64) -> Result<i64> {
        if let Some(prev) = self.get_doc_meta(path)? {
            self.conn.execute(
                "UPDATE docs SET mtime = ?1, size = ?2, length = ?3 WHERE doc_id = ?4",
                params![mtime, size as i64, length as i64, prev.doc_id],
            )?;
            self.bump_globals(0, length as i64 - prev.length as i64)?;
            Ok(prev.doc_id)
        } else {
            self.conn.execute(
                "INSERT INTO docs (path, mtime, size, length) VALUES (?1, ?2, ?3, ?4)",
                params![path, mtime, size as i64, length as i64],
            )?;
            self.bump_globals(1, length as i64)?;
            Ok(self.conn.last_insert_rowid())
        }
    }

    /// Remove a document, cascading to its postings and the affected term
    /// document frequencies. Unknown ids are a no-op.
    pub fn delete_document(&self, doc_id: i64) -> Result<()> {
        let length: Option<i64> = self
            .conn
            .query_row(
                "SELECT length FROM docs WHERE doc_id = ?1",
                [doc_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(length) = length else {
            return Ok(());
        };
        self.conn.execute(
            "UPDATE terms SET df = df - 1
             WHERE term_id IN (SELECT term_id FROM postings WHERE doc_id = ?1)",
            [doc_id],
        )?;
        self.conn
            .execute("DELETE FROM postings WHERE doc_id = ?1", [doc_id])?;
        self.conn
            .execute("DELETE FROM docs WHERE doc_id = ?1", [doc_id])?;
        self.bump_globals(-1, -length)?;
        Ok(())
    }

    /// Path and length for a document id.
    pub fn get_doc(&self, doc_id: i64) -> Result<Option<(String, u64)>> {
        let row = self
            .conn
            .query_row(
                "SELECT path, length FROM docs WHERE doc_id = ?1",
                [doc_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)),
            )
            .optional()?;
        Ok(row)
    }

    /// All `(doc_id, path)` pairs currently indexed.
    pub fn indexed_paths(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare("SELECT doc_id, path FROM docs")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- terms and postings ----

    /// Get-or-create the id for a term. Idempotent.
    pub fn intern_term(&self, term: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO terms (term, df) VALUES (?1, 0)",
            [term],
        )?;
        let id = self.conn.query_row(
            "SELECT term_id FROM terms WHERE term = ?1",
            [term],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Resolve a term string to `(term_id, df)`. Terms with `df == 0` are
    /// invisible here: they must never reach the ranker.
    pub fn resolve_term(&self, term: &str) -> Result<Option<(i64, u64)>> {
        let row = self
            .conn
            .query_row(
                "SELECT term_id, df FROM terms WHERE term = ?1 AND df > 0",
                [term],
                |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)),
            )
            .optional()?;
        Ok(row)
    }

    /// Replace all postings of a document in one shot, maintaining `df` for
    /// every term that enters or leaves the document.
    pub fn write_postings(&self, doc_id: i64, tf_by_term: &HashMap<i64, u64>) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT term_id FROM postings WHERE doc_id = ?1")?;
        let old: HashSet<i64> = stmt
            .query_map([doc_id], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        let mut df_up = self
            .conn
            .prepare("UPDATE terms SET df = df + 1 WHERE term_id = ?1")?;
        let mut df_down = self
            .conn
            .prepare("UPDATE terms SET df = df - 1 WHERE term_id = ?1")?;
        for term_id in tf_by_term.keys() {
            if !old.contains(term_id) {
                df_up.execute([term_id])?;
            }
        }
        for term_id in &old {
            if !tf_by_term.contains_key(term_id) {
                df_down.execute([term_id])?;
            }
        }
        drop(df_up);
        drop(df_down);

        self.conn
            .execute("DELETE FROM postings WHERE doc_id = ?1", [doc_id])?;
        let mut insert = self
            .conn
            .prepare("INSERT INTO postings (term_id, doc_id, tf) VALUES (?1, ?2, ?3)")?;
        for (term_id, tf) in tf_by_term {
            insert.execute(params![term_id, doc_id, *tf as i64])?;
        }
        Ok(())
    }

    /// The posting list of one term as `(doc_id, tf)` pairs.
    pub fn iter_postings(&self, term_id: i64) -> Result<Vec<(i64, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT doc_id, tf FROM postings WHERE term_id = ?1")?;
        let rows = stmt
            .query_map([term_id], |row| {
                Ok((row.get(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All live terms (df > 0) fully matched by `re`, as
    /// `(term_id, term, df)` triples.
    pub fn match_terms_regex(&self, re: &Regex) -> Result<Vec<(i64, String, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT term_id, term, df FROM terms WHERE df > 0")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (term_id, term, df) = row?;
            if re.is_match(&term) {
                out.push((term_id, term, df));
            }
        }
        Ok(out)
    }

    // ---- maintenance ----

    /// Full-rebuild reset: drop all content rows and zero the globals.
    /// Metadata other than the counters survives.
    pub fn truncate(&self) -> Result<()> {
        self.conn.execute("DELETE FROM postings", [])?;
        self.conn.execute("DELETE FROM terms", [])?;
        self.conn.execute("DELETE FROM docs", [])?;
        self.set_meta("doc_count", "0")?;
        self.set_meta("sum_len", "0")?;
        Ok(())
    }

    /// Audit the cross-table invariants: per-document length sums, per-term
    /// document frequencies, global counters, and posting referential
    /// integrity. Violations surface as [`EngineError::StoreCorrupt`].
    pub fn verify_invariants(&self) -> Result<()> {
        let bad_lengths: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM docs d
             WHERE d.length != COALESCE(
               (SELECT SUM(p.tf) FROM postings p WHERE p.doc_id = d.doc_id), 0)",
            [],
            |row| row.get(0),
        )?;
        if bad_lengths != 0 {
            return Err(corrupt(format!("{} documents with wrong length", bad_lengths)));
        }

        let bad_dfs: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM terms t
             WHERE t.df != (SELECT COUNT(*) FROM postings p WHERE p.term_id = t.term_id)",
            [],
            |row| row.get(0),
        )?;
        if bad_dfs != 0 {
            return Err(corrupt(format!("{} terms with wrong df", bad_dfs)));
        }

        let orphans: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM postings p
             WHERE p.doc_id NOT IN (SELECT doc_id FROM docs)
                OR p.term_id NOT IN (SELECT term_id FROM terms)",
            [],
            |row| row.get(0),
        )?;
        if orphans != 0 {
            return Err(corrupt(format!("{} orphan postings", orphans)));
        }

        let (n, sum_len) = self.globals()?;
        let (real_n, real_sum): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(length), 0) FROM docs",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if n != real_n as u64 || sum_len != real_sum as u64 {
            return Err(corrupt(format!(
                "globals N={} Σℓ={} disagree with tables N={} Σℓ={}",
                n, sum_len, real_n, real_sum
            )));
        }
        Ok(())
    }

    /// Logical contents as sorted `(term, path, tf)` triples. Diagnostic
    /// helper; also what the equivalence tests compare.
    pub fn postings_dump(&self) -> Result<Vec<(String, String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.term, d.path, p.tf
             FROM postings p
             JOIN terms t ON t.term_id = p.term_id
             JOIN docs d ON d.doc_id = p.doc_id
             ORDER BY t.term, d.path",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? as u64,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn corrupt(detail: String) -> anyhow::Error {
    EngineError::StoreCorrupt { detail }.into()
}
