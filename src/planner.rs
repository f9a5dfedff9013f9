//! Query planning: `|` alternation expanded to groups of term ids.
//!
//! Each alternative contributes its tokenized terms plus every indexed term
//! its text matches as a regular expression. The regex layer catches
//! identifier fragments the tokenizer would never produce from the query
//! (`acl.*load`, `set_user_?`), so dropping it would silently weaken recall.

use std::collections::HashSet;

use anyhow::Result;
use regex::Regex;

use crate::store::Store;
use crate::tokenizer::{tokenize, TokenizerOptions};

/// One resolved query term.
#[derive(Debug, Clone)]
pub struct PlannedTerm {
    pub term_id: i64,
    pub term: String,
    pub df: u64,
}

/// The effective term set of a query.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    /// Term ids per `|`-alternative, in query order. Groups carry no scoring
    /// semantics beyond their union; a term in several groups is not
    /// weighted twice.
    pub groups: Vec<Vec<i64>>,
    /// Union of all groups, insertion-ordered and deduplicated.
    pub terms: Vec<PlannedTerm>,
}

impl QueryPlan {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Expand a raw query string against the store's terms table.
///
/// `opts` must be the tokenizer options the index was built with.
pub fn plan(query: &str, opts: &TokenizerOptions, store: &Store) -> Result<QueryPlan> {
    let mut plan = QueryPlan::default();
    let mut union: HashSet<i64> = HashSet::new();

    for alt in query.split('|') {
        let alt = alt.trim();
        if alt.is_empty() {
            continue;
        }
        let mut group: Vec<i64> = Vec::new();
        let mut in_group: HashSet<i64> = HashSet::new();

        for token in tokenize(alt, opts) {
            if let Some((term_id, df)) = store.resolve_term(&token)? {
                if in_group.insert(term_id) {
                    group.push(term_id);
                }
                if union.insert(term_id) {
                    plan.terms.push(PlannedTerm {
                        term_id,
                        term: token,
                        df,
                    });
                }
            }
        }

        // Regex augmentation over the terms table; a pattern that fails to
        // compile just skips this step for its alternative. Terms are stored
        // lowercase, so the match is case-insensitive rather than lowering
        // the pattern (which would mangle classes like `[A-Z]`).
        match Regex::new(&format!("^(?i:{})$", alt)) {
            Ok(re) => {
                for (term_id, term, df) in store.match_terms_regex(&re)? {
                    if in_group.insert(term_id) {
                        group.push(term_id);
                    }
                    if union.insert(term_id) {
                        plan.terms.push(PlannedTerm { term_id, term, df });
                    }
                }
            }
            Err(e) => {
                log::debug!("skipping regex expansion for {:?}: {}", alt, e);
            }
        }

        plan.groups.push(group);
    }

    Ok(plan)
}
