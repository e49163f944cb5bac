//! Run-scoped parameters resolved from configuration and file names.

use serde::Deserialize;

/// Read-only parameters consulted by rule gating and file naming.
///
/// `db_version` and `collection_version` come from the collection key embedded
/// in the extract file names unless overridden on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunParameters {
    pub collection_key: String,
    pub db_version: String,
    pub collection_version: String,
    pub import_comment: String,
}

/// Global options from the `parameters` section of the configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Parameters {
    /// Lower-cased table names never ingested from extract files.
    #[serde(default)]
    pub do_not_import: Vec<String>,
    /// Comma-separated `tableName:ruleId` pairs that trigger on-demand
    /// single-rule reshape passes.
    #[serde(default)]
    pub op_enable_reshape_for: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Parameters {
    /// Parsed `op_enable_reshape_for` pairs; malformed entries are dropped.
    pub fn reshape_pairs(&self) -> Vec<(String, String)> {
        let Some(raw) = &self.op_enable_reshape_for else {
            return Vec::new();
        };
        raw.split(',')
            .filter_map(|pair| {
                let (table, rule_id) = pair.split_once(':')?;
                let table = table.trim();
                let rule_id = rule_id.trim();
                if table.is_empty() || rule_id.is_empty() {
                    return None;
                }
                Some((table.to_string(), rule_id.to_string()))
            })
            .collect()
    }

    pub fn should_import(&self, table: &str) -> bool {
        !self
            .do_not_import
            .iter()
            .any(|skip| skip.eq_ignore_ascii_case(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshape_pairs_split_on_comma_and_colon() {
        let params = Parameters {
            op_enable_reshape_for: Some("AWRHISTSYSMETRICSUMM:21, AWRHISTOSSTAT:22".to_string()),
            ..Parameters::default()
        };
        assert_eq!(
            params.reshape_pairs(),
            vec![
                ("AWRHISTSYSMETRICSUMM".to_string(), "21".to_string()),
                ("AWRHISTOSSTAT".to_string(), "22".to_string()),
            ]
        );
    }

    #[test]
    fn do_not_import_is_case_insensitive() {
        let params = Parameters {
            do_not_import: vec!["opkeylog".to_string()],
            ..Parameters::default()
        };
        assert!(!params.should_import("OPKEYLOG"));
        assert!(params.should_import("dbsummary"));
    }
}
