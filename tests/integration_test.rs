//! End-to-end tests for sx: index a real directory tree, then search it.

use std::fs;
use std::path::{Path, PathBuf};

use sx::{
    search, EngineError, IndexMode, IndexOptions, IndexSummary, Indexer, SearchOptions,
    SearchStatus, Store, TokenizerOptions,
};
use tempfile::TempDir;

/// Corpus root and store path inside one temp dir, kept apart so the store
/// never shows up in its own scan.
fn workspace() -> (TempDir, PathBuf, PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    fs::create_dir(&root).unwrap();
    let db = temp.path().join("idx.sqlite");
    (temp, root, db)
}

fn index_with(root: &Path, db: &Path, opts: IndexOptions, mode: IndexMode) -> IndexSummary {
    let store = Store::open(db).unwrap();
    let mut indexer = Indexer::new(store, opts);
    indexer.index(root, mode, None).unwrap()
}

fn index(root: &Path, db: &Path) -> IndexSummary {
    index_with(root, db, IndexOptions::default(), IndexMode::Incremental)
}

fn query(db: &Path, q: &str) -> Vec<(String, f64)> {
    query_with(db, q, SearchOptions::default())
}

fn query_with(db: &Path, q: &str, opts: SearchOptions) -> Vec<(String, f64)> {
    let store = Store::open(db).unwrap();
    search(&store, q, &opts)
        .unwrap()
        .hits
        .into_iter()
        .map(|h| (h.path, h.score))
        .collect()
}

// ==================== Ranking Scenarios ====================

#[test]
fn test_term_frequency_orders_hits() {
    let (_t, root, db) = workspace();
    fs::write(root.join("a.txt"), "hello world").unwrap();
    fs::write(root.join("b.txt"), "hello hello").unwrap();
    index(&root, &db);

    let hits = query(&db, "hello");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, "b.txt");
    assert_eq!(hits[1].0, "a.txt");
    assert!(hits[1].1 > 0.0);
}

#[test]
fn test_plain_and_stemmed_queries() {
    let (_t, root, db) = workspace();
    fs::create_dir(root.join("src")).unwrap();
    fs::write(root.join("src").join("cluster.c"), "cluster slots").unwrap();
    index(&root, &db);

    let hits = query(&db, "cluster");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "src/cluster.c");

    // A stemmed index folds "slots" down to "slot".
    let stemmed = TokenizerOptions {
        stem: true,
        stopwords: true,
    };
    let db2 = root.parent().unwrap().join("idx2.sqlite");
    index_with(
        &root,
        &db2,
        IndexOptions {
            tokenizer: stemmed,
            ..Default::default()
        },
        IndexMode::Incremental,
    );
    let hits = query_with(
        &db2,
        "slot",
        SearchOptions {
            tokenizer: stemmed,
            ..Default::default()
        },
    );
    assert_eq!(hits.len(), 1);
}

#[test]
fn test_identifier_split_makes_fragments_findable() {
    let (_t, root, db) = workspace();
    fs::write(
        root.join("parseHTTPRequest.py"),
        "def parseHTTPRequest(): pass",
    )
    .unwrap();
    index(&root, &db);

    let hits = query(&db, "http");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "parseHTTPRequest.py");
}

#[test]
fn test_path_boost_order_flip() {
    let (_t, root, db) = workspace();
    fs::create_dir(root.join("src")).unwrap();
    // Same term; the path of the first hit contains it, with lower tf.
    fs::write(root.join("src").join("token.c"), "token").unwrap();
    fs::write(root.join("misc.c"), "token token").unwrap();
    index(&root, &db);

    let boosted = query(&db, "token");
    assert_eq!(boosted[0].0, "src/token.c");

    let flat = query_with(
        &db,
        "token",
        SearchOptions {
            path_boost: 1.0,
            ..Default::default()
        },
    );
    assert_eq!(flat[0].0, "misc.c");
}

#[test]
fn test_alternation_with_regex_expansion() {
    let (_t, root, db) = workspace();
    fs::write(
        root.join("acl.c"),
        "void ACLLoad(void) {\n    ACLSetUser(u);\n}\n",
    )
    .unwrap();
    fs::write(root.join("server.c"), "int main(void) {\n    return 0;\n}\n").unwrap();
    index(&root, &db);

    let hits = query(&db, "ACLLoad|ACLSetUser|load");
    assert!(!hits.is_empty());
    assert_eq!(hits[0].0, "acl.c");
}

#[test]
fn test_alternation_without_matches() {
    let (_t, root, db) = workspace();
    fs::write(root.join("a.txt"), "hello world").unwrap();
    index(&root, &db);
    assert!(query(&db, "zzz|yyy").is_empty());
}

#[test]
fn test_path_filter_scopes_results() {
    let (_t, root, db) = workspace();
    fs::create_dir(root.join("src")).unwrap();
    fs::write(root.join("src").join("acl.c"), "ACLLoad here\n").unwrap();
    fs::write(root.join("other.c"), "ACLLoad there\n").unwrap();
    index(&root, &db);

    let hits = query_with(
        &db,
        "ACLLoad",
        SearchOptions {
            path_filter: Some("src/".to_string()),
            ..Default::default()
        },
    );
    assert_eq!(hits.len(), 1);
    assert!(hits[0].0.contains("src"));
}

// ==================== Incremental Behavior ====================

#[test]
fn test_reindex_after_deletion() {
    let (_t, root, db) = workspace();
    fs::write(root.join("a.txt"), "alpha unique").unwrap();
    fs::write(root.join("b.txt"), "beta common").unwrap();
    let first = index(&root, &db);
    assert_eq!(first.total_docs, 2);

    fs::remove_file(root.join("a.txt")).unwrap();
    let second = index(&root, &db);
    assert_eq!(second.removed, 1);
    assert_eq!(second.total_docs, 1);

    assert!(query(&db, "unique").is_empty());
    assert_eq!(query(&db, "common").len(), 1);
}

#[test]
fn test_empty_document_not_retried() {
    let (_t, root, db) = workspace();
    fs::write(root.join("x.md"), "").unwrap();

    let first = index(&root, &db);
    assert_eq!(first.indexed, 1);
    assert_eq!(first.total_docs, 1);

    let second = index(&root, &db);
    assert_eq!(second.indexed, 0);
    assert_eq!(second.unchanged, 1);

    let store = Store::open(&db).unwrap();
    let meta = store.get_doc_meta("x.md").unwrap().unwrap();
    assert_eq!(meta.length, 0);
}

#[test]
fn test_modified_file_is_reindexed() {
    let (_t, root, db) = workspace();
    fs::write(root.join("a.txt"), "original words").unwrap();
    index(&root, &db);
    assert_eq!(query(&db, "original").len(), 1);

    fs::write(root.join("a.txt"), "replacement vocabulary entirely").unwrap();
    let second = index(&root, &db);
    assert_eq!(second.indexed, 1);

    assert!(query(&db, "original").is_empty());
    assert_eq!(query(&db, "replacement").len(), 1);
}

// ==================== Status and Error Surfaces ====================

#[test]
fn test_empty_store_reports_distinct_status() {
    let (_t, _root, db) = workspace();
    let store = Store::open(&db).unwrap();
    let resp = search(&store, "anything", &SearchOptions::default()).unwrap();
    assert_eq!(resp.status, SearchStatus::EmptyIndex);
    assert!(resp.hits.is_empty());
}

#[test]
fn test_mismatched_tokenizer_options_refused() {
    let (_t, root, db) = workspace();
    fs::write(root.join("a.txt"), "hello").unwrap();
    index(&root, &db);

    let store = Store::open(&db).unwrap();
    let opts = SearchOptions {
        tokenizer: TokenizerOptions {
            stem: true,
            stopwords: true,
        },
        ..Default::default()
    };
    let err = search(&store, "hello", &opts).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::TokenizerMismatch { .. })
    ));
}

#[test]
fn test_indexed_root_recorded() {
    let (_t, root, db) = workspace();
    fs::write(root.join("a.txt"), "hello").unwrap();
    index(&root, &db);

    let store = Store::open(&db).unwrap();
    let recorded = store.indexed_root().unwrap().unwrap();
    assert_eq!(
        PathBuf::from(recorded),
        root.canonicalize().unwrap()
    );
    assert!(store.last_indexed_at().unwrap().is_some());
}

// ==================== Snippets ====================

#[test]
fn test_snippet_for_a_hit() {
    let (_t, root, db) = workspace();
    fs::write(
        root.join("notes.md"),
        "intro text\ncluster slots live here\ntrailing text\n",
    )
    .unwrap();
    index(&root, &db);

    let store = Store::open(&db).unwrap();
    let resp = search(&store, "cluster slots", &SearchOptions::default()).unwrap();
    assert_eq!(resp.hits.len(), 1);

    let hit = &resp.hits[0];
    let full_path = PathBuf::from(&resp.root).join(&hit.path);
    let snip = sx::snippet::best_line(&full_path, &hit.matched_terms)
        .unwrap()
        .unwrap();
    assert_eq!(snip.line_number, 2);
    assert_eq!(snip.text, "cluster slots live here");
    assert_eq!(snip.spans, vec![(0, 7), (8, 13)]);
}
