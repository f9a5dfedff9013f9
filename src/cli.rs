//! CLI argument parsing and command handlers.
//!
//! Exit codes: 0 success (including zero hits), 1 usage error, 2 I/O or
//! store error, 3 `status` against an uninitialized or out-of-scope index.
//! The bare form `sx "query" path/` is shorthand for
//! `sx search "query" --path path/` with `--snippet` implied.

use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::indexer::{Indexer, ProgressSink};
use crate::models::{IndexMode, IndexOptions, JsonHit, SearchOptions, SearchStatus};
use crate::output;
use crate::ranker;
use crate::scanner::{default_extensions, ScanConfig};
use crate::snippet;
use crate::store::{Store, DEFAULT_STORE_BASENAME};
use crate::tokenizer::TokenizerOptions;

/// sx: local BM25 full-text search for source and documentation trees
#[derive(Parser, Debug)]
#[command(
    name = "sx",
    version,
    about = "Index a directory once, then answer ranked keyword queries from a local BM25 index",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Enable verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Index database path
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_STORE_BASENAME)]
    pub index: PathBuf,

    /// Top K results
    #[arg(long, global = true, default_value_t = 10)]
    pub k: usize,

    /// BM25 k1 (term-frequency saturation)
    #[arg(long, global = true, default_value_t = 1.2)]
    pub k1: f64,

    /// BM25 b (length normalization)
    #[arg(long, global = true, default_value_t = 0.75)]
    pub b: f64,

    /// Boost for query terms found in a hit's path tokens
    #[arg(long = "path-boost", global = true, default_value_t = 1.5)]
    pub path_boost: f64,

    /// Enable the light stemmer (must match between index and search)
    #[arg(long, global = true)]
    pub stem: bool,

    /// Disable stopword filtering (must match between index and search)
    #[arg(long = "no-stopwords", global = true)]
    pub no_stopwords: bool,

    /// Only return results whose path contains this substring
    #[arg(long, global = true, value_name = "SUBSTR")]
    pub path: Option<String>,

    /// Comma-separated extensions/basenames (filter for search, include set for index)
    #[arg(long, global = true, value_name = ".a,.b")]
    pub ext: Option<String>,

    /// Emit results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Show a one-line snippet with a line number per hit
    #[arg(long, global = true)]
    pub snippet: bool,

    /// Highlight matches in snippets (ANSI, only on a terminal)
    #[arg(long, global = true)]
    pub color: bool,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Shorthand: `sx "query" [path/]`
    #[arg(value_name = "QUERY")]
    pub shorthand: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build or update the index for a directory tree
    Index {
        /// Root directory to index
        #[arg(value_name = "ROOT", default_value = ".")]
        root: PathBuf,

        /// Full rebuild (ignore incremental state)
        #[arg(long)]
        full: bool,

        /// Parsing worker threads (0 = host CPU count)
        #[arg(long, default_value_t = 0)]
        workers: usize,

        /// Disable the progress bar
        #[arg(long = "no-progress")]
        no_progress: bool,

        /// Write the store to this path instead of --index
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Rank indexed documents for a query (`|` separates alternatives)
    Search {
        /// Query string
        query: String,
    },

    /// Report whether the current directory is covered by the index
    Status,
}

impl Cli {
    /// Execute the parsed command; returns the process exit code.
    pub fn execute(self) -> Result<i32> {
        let log_level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .init();

        match self.command {
            Some(Command::Index {
                ref root,
                full,
                workers,
                no_progress,
                ref out,
            }) => {
                let root = root.clone();
                let out = out.clone();
                handle_index(&self, root, full, workers, no_progress, out)
            }
            Some(Command::Search { ref query }) => {
                let query = query.clone();
                handle_search(&self, &query, None, false)
            }
            Some(Command::Status) => handle_status(&self),
            None => match self.shorthand.len() {
                0 => {
                    Cli::command().print_help()?;
                    Ok(1)
                }
                1 => {
                    let query = self.shorthand[0].clone();
                    handle_search(&self, &query, None, true)
                }
                2 => {
                    if self.path.is_some() {
                        output::error("give either a positional path or --path, not both");
                        return Ok(1);
                    }
                    let query = self.shorthand[0].clone();
                    let path = self.shorthand[1].clone();
                    handle_search(&self, &query, Some(path), true)
                }
                _ => {
                    output::error("too many arguments; usage: sx \"query\" [path/]");
                    Ok(1)
                }
            },
        }
    }

    fn tokenizer_options(&self) -> TokenizerOptions {
        TokenizerOptions {
            stem: self.stem,
            stopwords: !self.no_stopwords,
        }
    }
}

/// Parse a comma-separated `--ext` list into a lowercased set.
fn parse_ext_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Handle the `index` subcommand.
fn handle_index(
    cli: &Cli,
    root: PathBuf,
    full: bool,
    workers: usize,
    no_progress: bool,
    out: Option<PathBuf>,
) -> Result<i32> {
    let store_path = out.unwrap_or_else(|| cli.index.clone());
    let extensions = match cli.ext.as_deref() {
        Some(raw) => parse_ext_list(raw),
        None => default_extensions(),
    };
    let opts = IndexOptions {
        scan: ScanConfig {
            extensions,
            ..Default::default()
        },
        tokenizer: cli.tokenizer_options(),
        workers,
    };
    let mode = if full {
        IndexMode::Full
    } else {
        IndexMode::Incremental
    };

    let store = Store::open(&store_path)?;
    let mut indexer = Indexer::new(store, opts);

    let bar = if no_progress {
        None
    } else {
        let bar = ProgressBar::new(0);
        bar.set_draw_target(ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        Some(bar)
    };
    let sink_fn = bar.clone().map(|bar| {
        move |done: usize, total: usize, current: &str| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
            bar.set_message(current.to_string());
        }
    });
    let sink: Option<&ProgressSink> = match &sink_fn {
        Some(f) => Some(f),
        None => None,
    };

    let summary = indexer.index(&root, mode, sink)?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    println!(
        "Indexed {} docs (unchanged {}, removed {}, failed {}); total {} (avgdl {:.1}) -> {}",
        summary.indexed,
        summary.unchanged,
        summary.removed,
        summary.failed,
        summary.total_docs,
        summary.avg_doc_len,
        store_path.display()
    );
    Ok(0)
}

/// Handle `search` and the bare shorthand form.
fn handle_search(
    cli: &Cli,
    query: &str,
    positional_path: Option<String>,
    implied_snippet: bool,
) -> Result<i32> {
    let opts = SearchOptions {
        k: cli.k,
        k1: cli.k1,
        b: cli.b,
        path_boost: cli.path_boost,
        path_filter: positional_path.or_else(|| cli.path.clone()),
        ext_filter: cli.ext.as_deref().map(parse_ext_list),
        tokenizer: cli.tokenizer_options(),
    };
    let want_snippet = cli.snippet || implied_snippet;

    let store = Store::open(&cli.index)?;
    let resp = ranker::search(&store, query, &opts)?;

    if resp.status == SearchStatus::EmptyIndex {
        log::warn!("index at {} holds no documents", cli.index.display());
    }

    let root = PathBuf::from(&resp.root);
    let mut records: Vec<JsonHit> = Vec::with_capacity(resp.hits.len());
    let mut snippets = Vec::with_capacity(resp.hits.len());
    for hit in &resp.hits {
        let snip = if want_snippet {
            match snippet::best_line(&root.join(&hit.path), &hit.matched_terms) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("no snippet for {}: {}", hit.path, e);
                    None
                }
            }
        } else {
            None
        };
        records.push(JsonHit {
            path: hit.path.clone(),
            score: hit.score,
            line: snip.as_ref().map(|s| s.line_number),
            snippet: snip.as_ref().map(|s| s.text.trim().to_string()),
            terms: hit.matched_terms.clone(),
        });
        snippets.push(snip);
    }

    if cli.json {
        output::print_json(&records)?;
        return Ok(0);
    }

    if resp.hits.is_empty() {
        println!("No results.");
        return Ok(0);
    }

    let color = cli.color && std::io::stdout().is_terminal();
    for (rank, (hit, snip)) in resp.hits.iter().zip(&snippets).enumerate() {
        let line = snip.as_ref().map(|s| s.line_number);
        println!("{}", output::hit_line(rank + 1, hit.score, &hit.path, line));
        if let Some(snip) = snip {
            let text = snip.text.trim_start();
            let trimmed = snip.text.len() - text.len();
            let spans: Vec<(usize, usize)> = snip
                .spans
                .iter()
                .filter(|(s, _)| *s >= trimmed)
                .map(|(s, e)| (s - trimmed, e - trimmed))
                .collect();
            println!("    {}", output::highlight(text.trim_end(), &spans, color));
        }
    }
    Ok(0)
}

/// Handle the `status` subcommand.
fn handle_status(cli: &Cli) -> Result<i32> {
    if !cli.index.exists() {
        println!("Indexed: no");
        println!("Index: {}", cli.index.display());
        println!("Reason: index file does not exist");
        return Ok(3);
    }

    let store = Store::open(&cli.index)?;
    let root = store.indexed_root()?;
    let (docs, _) = store.globals()?;
    let last = store.last_indexed_at()?;

    let Some(root) = root else {
        println!("Indexed: no");
        println!("Index: {}", cli.index.display());
        println!("Reason: index exists but has no root metadata");
        return Ok(3);
    };

    let root_path = PathBuf::from(&root);
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let covered = covers(&root_path, &cwd);

    println!("Indexed: {}", if covered { "yes" } else { "no" });
    println!("Index: {}", cli.index.display());
    if !covered {
        println!("Reason: current directory is outside the indexed root");
    }
    println!("Root: {}", root);
    println!("Docs: {}", docs);
    if let Some(last) = last {
        println!("Last updated: {}", last);
    }
    Ok(if covered { 0 } else { 3 })
}

/// A directory is covered when it equals the indexed root or sits below it.
fn covers(root: &Path, cwd: &Path) -> bool {
    let cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    cwd == root || cwd.starts_with(&root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorthand_parses_query_and_path() {
        let cli = Cli::try_parse_from(["sx", "hello world", "src/"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.shorthand, vec!["hello world", "src/"]);
    }

    #[test]
    fn test_search_subcommand() {
        let cli = Cli::try_parse_from(["sx", "search", "cluster", "--k", "5"]).unwrap();
        assert_eq!(cli.k, 5);
        match cli.command {
            Some(Command::Search { ref query }) => assert_eq!(query, "cluster"),
            _ => panic!("expected search subcommand"),
        }
    }

    #[test]
    fn test_index_flags() {
        let cli = Cli::try_parse_from([
            "sx", "index", "src", "--full", "--workers", "2", "--no-progress",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Index {
                ref root,
                full,
                workers,
                no_progress,
                ..
            }) => {
                assert_eq!(root, &PathBuf::from("src"));
                assert!(full);
                assert_eq!(workers, 2);
                assert!(no_progress);
            }
            _ => panic!("expected index subcommand"),
        }
    }

    #[test]
    fn test_full_flag_rejected_outside_index() {
        assert!(Cli::try_parse_from(["sx", "search", "q", "--full"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["sx", "search", "q", "--stem", "--no-stopwords"]).unwrap();
        let opts = cli.tokenizer_options();
        assert!(opts.stem);
        assert!(!opts.stopwords);
    }

    #[test]
    fn test_parse_ext_list() {
        let set = parse_ext_list(".C, .h,,makefile");
        assert!(set.contains(".c"));
        assert!(set.contains(".h"));
        assert!(set.contains("makefile"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_covers_checks_containment() {
        assert!(covers(Path::new("/repo"), Path::new("/repo")));
        assert!(covers(Path::new("/repo"), Path::new("/repo/src")));
        assert!(!covers(Path::new("/repo"), Path::new("/elsewhere")));
    }
}
