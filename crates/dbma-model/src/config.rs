//! Transformer configuration document.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::params::Parameters;
use crate::rule::RuleSet;
use crate::schema::SchemaConfig;

/// The whole configuration document: global run options, the prioritized rule
/// set, and the version-gated table schemas.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransformerConfig {
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub rules: RuleSet,
    #[serde(default)]
    pub table_schemas: SchemaConfig,
}

impl TransformerConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn from_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleAction, RuleKind};

    #[test]
    fn parses_a_complete_document() {
        let json = r#"{
            "parameters": {
                "do_not_import": ["opkeylog"],
                "op_enable_reshape_for": "AWRHISTSYSMETRICSUMM:21"
            },
            "rules": {
                "21": {
                    "priority": 21,
                    "status": "ENABLED",
                    "execution_group": "0",
                    "type": "VARIABLE",
                    "action": "CREATE",
                    "min_db_version": "111",
                    "max_db_version": "193",
                    "min_sql_script_version": "2.0.1",
                    "max_sql_script_version": "9.9.9",
                    "action_details": {
                        "varname": "AWRHISTSYSMETRICSUMM",
                        "datatype": "DICTIONARY",
                        "value": "{\"Active Sessions\": \"AAS\"}",
                        "expr1": "",
                        "if_error": "",
                        "store": "BIGQUERY"
                    }
                }
            },
            "table_schemas": {
                "2.0.3": {
                    "121,122": {"dbsummary": [["PKEY", "STRING"]]}
                }
            }
        }"#;
        let config = TransformerConfig::from_str(json).unwrap();
        assert_eq!(config.rules.len(), 1);
        let rule = config.rules.get("21").unwrap();
        assert_eq!(rule.kind, RuleKind::Variable);
        assert_eq!(rule.action, RuleAction::Create);
        assert!(rule.is_enabled());
        assert_eq!(config.parameters.reshape_pairs().len(), 1);
        assert!(config.table_schemas.contains_key("2.0.3"));
    }
}
