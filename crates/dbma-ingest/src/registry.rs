//! In-memory table registry shared by ingestion and the rule executor.

use std::collections::BTreeMap;

use polars::prelude::DataFrame;
use tracing::warn;

/// Named tables keyed by upper-cased name. All lookups go through the same
/// canonicalization, so rule configuration may spell table names in any case.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: BTreeMap<String, DataFrame>,
}

fn canonical(name: &str) -> String {
    name.trim().to_uppercase()
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&DataFrame> {
        self.tables.get(&canonical(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DataFrame> {
        self.tables.get_mut(&canonical(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(&canonical(name))
    }

    /// Insert or replace a table.
    pub fn insert(&mut self, name: &str, frame: DataFrame) {
        self.tables.insert(canonical(name), frame);
    }

    /// Append `frame` to an existing table of the same shape; on a shape
    /// mismatch (or when the table is new) the frame replaces the entry.
    pub fn concat_or_replace(&mut self, name: &str, frame: DataFrame) {
        let key = canonical(name);
        if let Some(existing) = self.tables.get(&key) {
            match existing.vstack(&frame) {
                Ok(combined) => {
                    self.tables.insert(key, combined);
                    return;
                }
                Err(err) => {
                    warn!(table = %key, error = %err, "consolidation failed; replacing table");
                }
            }
        }
        self.tables.insert(key, frame);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataFrame)> {
        self.tables.iter().map(|(name, frame)| (name.as_str(), frame))
    }
}
