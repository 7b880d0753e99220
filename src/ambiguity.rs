//! Ambiguity resolution - the two-phase selection protocol
//!
//! A single-target match where some source key hits more than one target
//! row cannot pick a winner on its own. The first call returns an
//! `AmbiguityReport` listing every such key with its candidates in table
//! order; the caller re-invokes the same match carrying `Selections`. The
//! engine keeps no state between the two calls - the pending request lives
//! entirely in the caller.

use crate::table::Row;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Caller-supplied choices: literal key value -> candidate index into the
/// reported candidate list.
pub type Selections = HashMap<String, usize>;

/// Keys that matched more than one target row, with their candidates in
/// table order. Ordered map so reports serialize deterministically.
#[derive(Debug, Clone, Serialize)]
pub struct AmbiguityReport {
    pub multi_value_keys: BTreeMap<String, Vec<Row>>,
}

impl AmbiguityReport {
    pub fn new() -> Self {
        Self {
            multi_value_keys: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.multi_value_keys.is_empty()
    }

    pub fn key_count(&self) -> usize {
        self.multi_value_keys.len()
    }

    /// Record candidates for a key. Only the first sighting wins; every
    /// later source row with the same key has the same candidate list.
    pub fn record(&mut self, key: &str, candidates: Vec<Row>) {
        self.multi_value_keys
            .entry(key.to_string())
            .or_insert(candidates);
    }
}

impl Default for AmbiguityReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the candidate index for an ambiguous key. An omitted or
/// out-of-range selection falls back to candidate 0, so a retry always
/// terminates.
pub fn choose_candidate(selections: Option<&Selections>, key: &str, candidate_count: usize) -> usize {
    selections
        .and_then(|s| s.get(key))
        .copied()
        .filter(|&idx| idx < candidate_count)
        .unwrap_or(0)
}
