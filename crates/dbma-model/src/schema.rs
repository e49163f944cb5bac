//! Table schema registry and reconciliation.
//!
//! The registry maps a lower-case table name to its ordered `(column, type)`
//! list. Configured entries come from the transformer configuration document,
//! selected by collector-script version and database version; runtime-observed
//! columns are merged in through one of three reconciliation modes.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::info;

use crate::error::{ModelError, Result};

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "(String, String)")]
pub struct ColumnSpec {
    pub name: String,
    pub logical_type: String,
}

impl From<(String, String)> for ColumnSpec {
    fn from((name, logical_type): (String, String)) -> Self {
        Self { name, logical_type }
    }
}

/// How runtime-observed columns are reconciled with configured schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaMode {
    /// Configured entries only; a schema-less output table is a hard error.
    Manual,
    /// Observed columns always replace the configured entry.
    Auto,
    /// Observed columns fill in only when no entry exists.
    #[default]
    Fillgap,
}

impl SchemaMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "MANUAL" => Some(Self::Manual),
            "AUTO" => Some(Self::Auto),
            "FILLGAP" => Some(Self::Fillgap),
            _ => None,
        }
    }
}

/// Configured schemas: collector-script version -> db-version-range key ->
/// table name -> column list. The range key is a comma-joined list of
/// three-digit version prefixes, e.g. `"121,122,123,180,190"`.
pub type SchemaConfig = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<ColumnSpec>>>>;

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: BTreeMap<String, Vec<ColumnSpec>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the configured schema set for a `(collection_version, db_version)`
    /// pair. No match is fatal for the run: nothing may be ingested without a
    /// schema baseline.
    pub fn resolve(
        config: &SchemaConfig,
        collection_version: &str,
        db_version: &str,
    ) -> Result<Self> {
        let by_db_version =
            config
                .get(collection_version)
                .ok_or_else(|| ModelError::SchemaNotFound {
                    collection_version: collection_version.to_string(),
                    db_version: db_version.to_string(),
                })?;
        let mut selected = None;
        for (range_key, tables) in by_db_version {
            if range_key.contains(db_version) {
                selected = Some(tables);
            }
        }
        let tables = selected.ok_or_else(|| ModelError::SchemaNotFound {
            collection_version: collection_version.to_string(),
            db_version: db_version.to_string(),
        })?;
        let entries = tables
            .iter()
            .map(|(table, columns)| (table.to_lowercase(), columns.clone()))
            .collect();
        Ok(Self { entries })
    }

    pub fn get(&self, table: &str) -> Option<&[ColumnSpec]> {
        self.entries.get(&table.to_lowercase()).map(Vec::as_slice)
    }

    /// Configured column names for a table, if any.
    pub fn headers(&self, table: &str) -> Option<Vec<String>> {
        self.get(table)
            .map(|columns| columns.iter().map(|column| column.name.clone()).collect())
    }

    pub fn insert(&mut self, table: &str, columns: Vec<ColumnSpec>) {
        self.entries.insert(table.to_lowercase(), columns);
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Merge runtime-observed columns for a table according to `mode`.
    ///
    /// AUTO replaces the entry outright with `(column, STRING)` pairs in
    /// observed order; FILLGAP writes the same only when the table has no
    /// entry yet, never touching a curated one; MANUAL never mutates.
    pub fn reconcile(&mut self, mode: SchemaMode, table: &str, observed: &[String]) {
        let key = table.to_lowercase();
        match mode {
            SchemaMode::Manual => {}
            SchemaMode::Auto => {
                self.entries.insert(key, string_columns(observed));
            }
            SchemaMode::Fillgap => {
                if !self.entries.contains_key(&key) {
                    info!(table = %table, "filling schema gap from observed columns");
                    self.entries.insert(key, string_columns(observed));
                }
            }
        }
    }
}

fn string_columns(observed: &[String]) -> Vec<ColumnSpec> {
    observed
        .iter()
        .map(|column| ColumnSpec {
            name: clean_header(column),
            logical_type: "STRING".to_string(),
        })
        .collect()
}

/// Strip the quote, bracket, and concatenation artifacts some collector
/// scripts leave in column headers, along with any internal whitespace.
pub fn clean_header(raw: &str) -> String {
    raw.replace("'||", "")
        .replace("||'", "")
        .replace(['\'', '"', '[', ']', ' '], "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn fillgap_preserves_curated_entries() {
        let mut registry = SchemaRegistry::new();
        let curated = vec![ColumnSpec::from(("PKEY".to_string(), "STRING".to_string()))];
        registry.insert("dbsummary", curated.clone());
        registry.reconcile(SchemaMode::Fillgap, "dbsummary", &observed(&["A", "B"]));
        assert_eq!(registry.get("dbsummary").unwrap(), curated.as_slice());
    }

    #[test]
    fn fillgap_backfills_missing_entries() {
        let mut registry = SchemaRegistry::new();
        registry.reconcile(SchemaMode::Fillgap, "newtable", &observed(&["A", "B"]));
        let entry = registry.get("newtable").unwrap();
        assert_eq!(entry.len(), 2);
        assert_eq!(entry[0].name, "A");
        assert_eq!(entry[0].logical_type, "STRING");
    }

    #[test]
    fn auto_overwrites_in_observed_order() {
        let mut registry = SchemaRegistry::new();
        registry.insert(
            "dbsummary",
            vec![ColumnSpec::from(("OLD".to_string(), "NUMERIC".to_string()))],
        );
        registry.reconcile(SchemaMode::Auto, "dbsummary", &observed(&["B", "A", "B"]));
        let entry = registry.get("dbsummary").unwrap();
        let names: Vec<&str> = entry.iter().map(|column| column.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A", "B"]);
        assert!(entry.iter().all(|column| column.logical_type == "STRING"));
    }

    #[test]
    fn manual_never_mutates() {
        let mut registry = SchemaRegistry::new();
        registry.reconcile(SchemaMode::Manual, "anything", &observed(&["A"]));
        assert!(registry.get("anything").is_none());
    }

    #[test]
    fn clean_header_strips_artifacts() {
        assert_eq!(clean_header("'||HOST_NAME||'"), "HOST_NAME");
        assert_eq!(clean_header("\"METRIC NAME\""), "METRICNAME");
        assert_eq!(clean_header("[PERC90]"), "PERC90");
    }

    #[test]
    fn resolve_matches_db_version_range_key() {
        let json = r#"{
            "2.0.3": {
                "121,122,123,180,190": {
                    "dbsummary": [["PKEY", "STRING"], ["DBID", "STRING"]]
                }
            }
        }"#;
        let config: SchemaConfig = serde_json::from_str(json).unwrap();
        let registry = SchemaRegistry::resolve(&config, "2.0.3", "121").unwrap();
        assert_eq!(registry.headers("dbsummary").unwrap(), vec!["PKEY", "DBID"]);

        let missing = SchemaRegistry::resolve(&config, "2.0.3", "999");
        assert!(missing.is_err());
        let missing = SchemaRegistry::resolve(&config, "9.9.9", "121");
        assert!(missing.is_err());
    }
}
