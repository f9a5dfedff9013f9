//! Snippet selection: the single best-matching line of a hit, with the
//! byte spans of each term occurrence.
//!
//! Selection counts distinct matched terms per line as whole words; when a
//! term only ever occurs inside larger identifiers (an `http` produced by
//! splitting `parseHTTPRequest`), a substring pass takes over. Rendering is
//! the shell's concern; this module returns data only.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

/// The chosen excerpt for one hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    /// 1-indexed line number within the file.
    pub line_number: usize,
    pub text: String,
    /// Sorted, non-overlapping byte ranges of term matches in `text`.
    pub spans: Vec<(usize, usize)>,
}

/// Pick the line of `path` that matches `terms` best.
///
/// Returns `None` for an empty file. Ties go to the earliest line; a file
/// with no occurrence at all yields its first line with no spans.
pub fn best_line(path: &Path, terms: &[String]) -> Result<Option<Snippet>> {
    let file = File::open(path)
        .with_context(|| format!("cannot open {} for snippet", path.display()))?;
    let reader = BufReader::new(file);

    // (count, line_no, text); whole-word wins over the substring fallback.
    let mut best_whole: Option<(usize, usize, String)> = None;
    let mut best_sub: Option<(usize, usize, String)> = None;
    let mut first_line: Option<String> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("cannot read {}", path.display()))?;
        if first_line.is_none() {
            first_line = Some(line.clone());
        }
        let lowered = line.to_ascii_lowercase();
        let whole = distinct_matches(&lowered, terms, true);
        if whole > 0 && best_whole.as_ref().map(|(c, _, _)| whole > *c).unwrap_or(true) {
            best_whole = Some((whole, idx + 1, line.clone()));
        }
        let sub = distinct_matches(&lowered, terms, false);
        if sub > 0 && best_sub.as_ref().map(|(c, _, _)| sub > *c).unwrap_or(true) {
            best_sub = Some((sub, idx + 1, line));
        }
    }

    let Some(first) = first_line else {
        return Ok(None);
    };

    let whole_word = best_whole.is_some();
    let (line_number, text) = match best_whole.or(best_sub) {
        Some((_, line_no, text)) => (line_no, text),
        None => (1, first),
    };

    let lowered = text.to_ascii_lowercase();
    let mut spans = Vec::new();
    for term in terms {
        spans.extend(term_spans(&lowered, term, whole_word));
    }
    let spans = merge_spans(spans);

    Ok(Some(Snippet {
        line_number,
        text,
        spans,
    }))
}

/// How many distinct terms occur in `line` (already lowercased).
fn distinct_matches(line: &str, terms: &[String], whole_word: bool) -> usize {
    terms
        .iter()
        .filter(|t| !term_spans(line, t, whole_word).is_empty())
        .count()
}

/// Byte ranges of every occurrence of `term` in `line`, optionally bounded
/// by word characters (`[A-Za-z0-9_]`).
fn term_spans(line: &str, term: &str, whole_word: bool) -> Vec<(usize, usize)> {
    if term.is_empty() {
        return Vec::new();
    }
    let bytes = line.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    line.match_indices(term)
        .filter(|(start, matched)| {
            if !whole_word {
                return true;
            }
            let end = start + matched.len();
            let left_ok = *start == 0 || !is_word(bytes[start - 1]);
            let right_ok = end == bytes.len() || !is_word(bytes[end]);
            left_ok && right_ok
        })
        .map(|(start, matched)| (start, start + matched.len()))
        .collect()
}

/// Sort spans and coalesce overlaps so renderers never nest highlights.
fn merge_spans(mut spans: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    spans.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some((_, last_end)) if start <= *last_end => {
                *last_end = (*last_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_picks_line_with_most_distinct_terms() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.c");
        fs::write(&path, "cluster here\ncluster slots here\nslots only\n").unwrap();

        let snip = best_line(&path, &terms(&["cluster", "slots"]))
            .unwrap()
            .unwrap();
        assert_eq!(snip.line_number, 2);
        assert_eq!(snip.text, "cluster slots here");
        assert_eq!(snip.spans, vec![(0, 7), (8, 13)]);
    }

    #[test]
    fn test_tie_goes_to_earliest_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.c");
        fs::write(&path, "alpha beta\ngamma\nalpha beta\n").unwrap();

        let snip = best_line(&path, &terms(&["alpha", "beta"])).unwrap().unwrap();
        assert_eq!(snip.line_number, 1);
    }

    #[test]
    fn test_whole_word_matching_is_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.c");
        fs::write(&path, "void ACLLoad(void);\nacl load table\n").unwrap();

        let snip = best_line(&path, &terms(&["load"])).unwrap().unwrap();
        // "ACLLoad" contains "load" only as a substring; line 2 has the word.
        assert_eq!(snip.line_number, 2);
        assert_eq!(snip.spans, vec![(4, 8)]);
    }

    #[test]
    fn test_substring_fallback_for_split_identifiers() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.py");
        fs::write(&path, "def parseHTTPRequest(): pass\n").unwrap();

        let snip = best_line(&path, &terms(&["http"])).unwrap().unwrap();
        assert_eq!(snip.line_number, 1);
        assert_eq!(snip.spans, vec![(9, 13)]);
    }

    #[test]
    fn test_no_match_returns_first_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.txt");
        fs::write(&path, "first line\nsecond line\n").unwrap();

        let snip = best_line(&path, &terms(&["absent"])).unwrap().unwrap();
        assert_eq!(snip.line_number, 1);
        assert!(snip.spans.is_empty());
    }

    #[test]
    fn test_empty_file_yields_none() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.txt");
        fs::write(&path, "").unwrap();
        assert_eq!(best_line(&path, &terms(&["x"])).unwrap(), None);
    }

    #[test]
    fn test_overlapping_spans_merged() {
        assert_eq!(
            merge_spans(vec![(0, 4), (2, 6), (8, 9)]),
            vec![(0, 6), (8, 9)]
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(best_line(&temp.path().join("gone.txt"), &terms(&["x"])).is_err());
    }
}
