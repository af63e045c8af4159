//! Per-call outcome of the bulk loaders.
//!
//! Business-rule failures never surface as errors: each item is either loaded
//! or rejected with a [`RejectReason`], and the caller gets both lists back.

use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("already exists")]
    Duplicate,
    #[error("unknown user")]
    UnknownUser,
    #[error("unknown song")]
    UnknownSong,
    #[error("score '{0}' is not an integer between 1 and 5")]
    InvalidScore(String),
    #[error("field '{0}' is required but was empty")]
    MissingField(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rejected<K> {
    pub key: K,
    pub reason: RejectReason,
}

/// Result of processing one item.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ItemOutcome<K> {
    Loaded(K),
    Rejected(K, RejectReason),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoadReport<K> {
    pub loaded: Vec<K>,
    pub rejected: Vec<Rejected<K>>,
}

impl<K> Default for LoadReport<K> {
    fn default() -> Self {
        Self {
            loaded: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<K: Ord + Clone> LoadReport<K> {
    pub(crate) fn record(&mut self, outcome: ItemOutcome<K>) {
        match outcome {
            ItemOutcome::Loaded(key) => self.loaded.push(key),
            ItemOutcome::Rejected(key, reason) => self.rejected.push(Rejected { key, reason }),
        }
    }

    /// Number of processed items.
    pub fn total(&self) -> usize {
        self.loaded.len() + self.rejected.len()
    }

    pub fn loaded_keys(&self) -> BTreeSet<K> {
        self.loaded.iter().cloned().collect()
    }

    pub fn rejected_keys(&self) -> BTreeSet<K> {
        self.rejected.iter().map(|r| r.key.clone()).collect()
    }

    pub fn rejection_for(&self, key: &K) -> Option<&RejectReason> {
        self.rejected
            .iter()
            .find(|r| &r.key == key)
            .map(|r| &r.reason)
    }
}
