//! Transformation rule definitions.
//!
//! Rules are loaded once from the transformer configuration and never mutated;
//! only their execution outcome is recorded per run. A rule is eligible for a
//! pass when it is enabled, belongs to the requested execution group, and both
//! the source database version and the collector-script version fall inside
//! its compatibility window.

use std::fmt;

use serde::Deserialize;
use serde::de::{self, Deserializer, MapAccess, Visitor};

use crate::error::{ModelError, Result};

/// What a rule evaluates to or acts upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    Variable,
    Number,
    Freestyle,
    CreateView,
    Other(String),
}

impl From<&str> for RuleKind {
    fn from(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "VARIABLE" => Self::Variable,
            "NUMBER" => Self::Number,
            "FREESTYLE" => Self::Freestyle,
            "CREATE VIEW" | "CREATE_VIEW" => Self::CreateView,
            other => Self::Other(other.to_string()),
        }
    }
}

/// How a rule mutates the table registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Create,
    AddOrUpdateColumn,
    CreateOrReplaceDataframe,
    Freestyle,
    ExecuteSql,
    Other(String),
}

impl From<&str> for RuleAction {
    fn from(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "CREATE" => Self::Create,
            "ADD_OR_UPDATE_COLUMN" => Self::AddOrUpdateColumn,
            "CREATE_OR_REPLACE_DATAFRAME" => Self::CreateOrReplaceDataframe,
            "FREESTYLE" => Self::Freestyle,
            "EXECUTE_SQL" => Self::ExecuteSql,
            other => Self::Other(other.to_string()),
        }
    }
}

fn kind_from_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<RuleKind, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(RuleKind::from(raw.as_str()))
}

fn action_from_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<RuleAction, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(RuleAction::from(raw.as_str()))
}

/// Per-rule payload: expressions, target names, and variable typing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionDetails {
    #[serde(default)]
    pub expr1: String,
    #[serde(default)]
    pub if_error: String,
    #[serde(default)]
    pub ifcondition1: Option<String>,
    #[serde(default)]
    pub dataframe_name: String,
    #[serde(default)]
    pub column_name: String,
    #[serde(default)]
    pub target_dataframe_name: String,
    #[serde(default)]
    pub target_object_name: String,
    #[serde(default)]
    pub varname: String,
    #[serde(default)]
    pub datatype: String,
    #[serde(default)]
    pub value: serde_json::Value,
    /// Where materialized tables go: `CSV_ONLY`, `BIGQUERY`, or absent (no emission).
    #[serde(default)]
    pub store: Option<String>,
}

/// One named transformation rule from the configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub priority: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub execution_group: String,
    #[serde(rename = "type", deserialize_with = "kind_from_string")]
    pub kind: RuleKind,
    #[serde(deserialize_with = "action_from_string")]
    pub action: RuleAction,
    #[serde(default)]
    pub min_db_version: String,
    #[serde(default)]
    pub max_db_version: String,
    #[serde(default)]
    pub min_sql_script_version: String,
    #[serde(default)]
    pub max_sql_script_version: String,
    #[serde(default)]
    pub action_details: ActionDetails,
}

impl Rule {
    pub fn is_enabled(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("ENABLED")
    }
}

/// Rule set preserving the declaration order of the configuration document.
///
/// Declaration order is the stable tie-break when two rules share a priority.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    entries: Vec<(String, Rule)>,
}

impl RuleSet {
    pub fn new(entries: Vec<(String, Rule)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.entries
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, rule)| rule)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.entries.iter().map(|(id, rule)| (id.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rule identifiers sorted by ascending priority, declaration order on ties.
    pub fn ids_by_priority(&self) -> Vec<&str> {
        let mut ids: Vec<(usize, &str, i64)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, (id, rule))| (idx, id.as_str(), rule.priority))
            .collect();
        ids.sort_by_key(|&(idx, _, priority)| (priority, idx));
        ids.into_iter().map(|(_, id, _)| id).collect()
    }
}

impl<'de> Deserialize<'de> for RuleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RuleSetVisitor;

        impl<'de> Visitor<'de> for RuleSetVisitor {
            type Value = RuleSet;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of rule id to rule definition")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((id, rule)) = access.next_entry::<String, Rule>()? {
                    entries.push((id, rule));
                }
                Ok(RuleSet::new(entries))
            }
        }

        deserializer.deserialize_map(RuleSetVisitor)
    }
}

/// Numeric prefix used by compatibility gating: dots removed, first three
/// digits. `"19.1"` and `"191"` both map to 191.
pub fn version_prefix(raw: &str) -> Result<u32> {
    let cleaned: String = raw.trim().chars().filter(|ch| *ch != '.').collect();
    let prefix: String = cleaned.chars().take(3).collect();
    if prefix.is_empty() || !prefix.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ModelError::InvalidVersion(raw.to_string()));
    }
    prefix
        .parse::<u32>()
        .map_err(|_| ModelError::InvalidVersion(raw.to_string()))
}

/// Inclusive window check on three-digit version prefixes.
pub fn version_in_window(value: &str, min: &str, max: &str) -> Result<bool> {
    let value = version_prefix(value)?;
    let min = version_prefix(min)?;
    let max = version_prefix(max)?;
    Ok(value >= min && value <= max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_prefix_strips_dots() {
        assert_eq!(version_prefix("19.1").unwrap(), 191);
        assert_eq!(version_prefix("121").unwrap(), 121);
        assert_eq!(version_prefix("2.0.3").unwrap(), 203);
        assert_eq!(version_prefix("18.0.0.0").unwrap(), 180);
    }

    #[test]
    fn version_prefix_rejects_garbage() {
        assert!(version_prefix("").is_err());
        assert!(version_prefix("abc").is_err());
    }

    #[test]
    fn window_is_inclusive() {
        assert!(version_in_window("121", "121", "180").unwrap());
        assert!(version_in_window("180", "121", "180").unwrap());
        assert!(!version_in_window("112", "121", "180").unwrap());
        assert!(!version_in_window("190", "121", "180").unwrap());
    }

    #[test]
    fn rule_set_orders_by_priority_then_declaration() {
        let json = r#"{
            "b": {"priority": 2, "type": "VARIABLE", "action": "CREATE"},
            "a": {"priority": 1, "type": "VARIABLE", "action": "CREATE"},
            "c": {"priority": 2, "type": "VARIABLE", "action": "CREATE"}
        }"#;
        let rules: RuleSet = serde_json::from_str(json).unwrap();
        assert_eq!(rules.ids_by_priority(), vec!["a", "b", "c"]);
    }

    #[test]
    fn kind_and_action_parse_case_insensitively() {
        assert_eq!(RuleKind::from("variable"), RuleKind::Variable);
        assert_eq!(RuleKind::from("CREATE VIEW"), RuleKind::CreateView);
        assert_eq!(RuleAction::from("add_or_update_column"), RuleAction::AddOrUpdateColumn);
    }
}
