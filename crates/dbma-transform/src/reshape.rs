//! Long-to-wide pivot engine.
//!
//! Converts one-row-per-metric time-series extracts into one-column-per-metric
//! tables so downstream rules can reference `AAS_PERC90` instead of filtering
//! rows. The pivot parameters come from a `VARIABLE` rule whose name matches
//! the source table.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::{Result, anyhow, bail};
use polars::prelude::{Column, DataFrame};
use tracing::warn;

use crate::data_utils::{any_to_string, parse_f64};
use crate::value::Value;

/// Pivot parameters as authored in the rule configuration.
#[derive(Debug, Clone, Default)]
pub struct ReshapeSpec {
    pub index_columns: Vec<String>,
    pub target_column: String,
    pub stat_columns: Vec<String>,
    pub filter_rows: bool,
    pub rename_map: BTreeMap<String, String>,
    pub store: Option<String>,
}

impl ReshapeSpec {
    /// Extract the spec from the map value a reshape-defining rule produced.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| anyhow!("reshape parameters must be a map, found {}", value.type_name()))?;

        let index_columns = string_list(map.get("INDEX_COLUMNS"))
            .ok_or_else(|| anyhow!("reshape parameters missing INDEX_COLUMNS"))?;
        let target_column = map
            .get("TARGET_COLUMN")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("reshape parameters missing TARGET_COLUMN"))?
            .to_string();
        let stat_columns = string_list(map.get("TARGET_STATS_COLUMNS"))
            .ok_or_else(|| anyhow!("reshape parameters missing TARGET_STATS_COLUMNS"))?;
        let filter_rows = map
            .get("filterrows")
            .and_then(|v| v.as_str())
            .is_some_and(|v| v.eq_ignore_ascii_case("YES"));
        let rename_map = map
            .get("from_to_rows_to_columns")
            .and_then(Value::as_map)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(key, value)| {
                        value.as_str().map(|v| (key.clone(), v.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let store = map
            .get("store")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(Self {
            index_columns,
            target_column,
            stat_columns,
            filter_rows,
            rename_map,
            store,
        })
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value? {
        Value::Str(s) => Some(vec![s.clone()]),
        Value::List(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

/// Pivot a long-format table wide.
///
/// Output columns are the index columns followed by one block per stat, each
/// block holding one column per metric (sorted by original metric name), named
/// `<renamed-metric>_<stat>`. Rows are grouped by the index columns and sorted
/// numerically where every key component parses as a number.
pub fn reshape(frame: &DataFrame, spec: &ReshapeSpec) -> Result<DataFrame> {
    if frame.height() == 0 {
        return Ok(frame.clone());
    }

    let index_names = resolve_all(frame, &spec.index_columns)?;
    let target_name = resolve_one(frame, &spec.target_column)?;
    let stat_names = resolve_all(frame, &spec.stat_columns)?;

    let index_cells: Vec<Vec<String>> = index_names
        .iter()
        .map(|name| cells_of(frame, name))
        .collect::<Result<_>>()?;
    let target_cells = cells_of(frame, &target_name)?;
    let stat_cells: Vec<Vec<String>> = stat_names
        .iter()
        .map(|name| cells_of(frame, name))
        .collect::<Result<_>>()?;

    let keep: Vec<usize> = (0..frame.height())
        .filter(|&row| !spec.filter_rows || spec.rename_map.contains_key(&target_cells[row]))
        .collect();
    if spec.filter_rows && keep.is_empty() {
        warn!(
            target = %spec.target_column,
            "every row was filtered out; producing an empty wide table"
        );
        let columns: Vec<Column> = index_names
            .iter()
            .map(|name| Column::new(name.as_str().into(), Vec::<String>::new()))
            .collect();
        return Ok(DataFrame::new(columns)?);
    }

    // Group rows by index key; reject duplicate (key, metric) pairs since the
    // pivot could not represent both values.
    let mut keys: Vec<Vec<String>> = Vec::new();
    let mut key_index: BTreeMap<Vec<String>, usize> = BTreeMap::new();
    let mut metrics: BTreeSet<String> = BTreeSet::new();
    let mut seen: HashSet<(Vec<String>, String)> = HashSet::new();
    let mut cell_values: BTreeMap<(usize, String, usize), String> = BTreeMap::new();

    for &row in &keep {
        let key: Vec<String> = index_cells.iter().map(|cells| cells[row].clone()).collect();
        let metric = target_cells[row].clone();
        if !seen.insert((key.clone(), metric.clone())) {
            bail!(
                "duplicate entry for metric '{metric}' within one index group; cannot pivot"
            );
        }
        let slot = *key_index.entry(key.clone()).or_insert_with(|| {
            keys.push(key.clone());
            keys.len() - 1
        });
        metrics.insert(metric.clone());
        for (stat_idx, cells) in stat_cells.iter().enumerate() {
            cell_values.insert((slot, metric.clone(), stat_idx), cells[row].clone());
        }
    }

    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| compare_keys(&keys[a], &keys[b]));

    let mut columns: Vec<Column> = Vec::new();
    for (pos, name) in index_names.iter().enumerate() {
        let values: Vec<String> = order.iter().map(|&slot| keys[slot][pos].clone()).collect();
        columns.push(Column::new(name.as_str().into(), values));
    }
    for (stat_idx, stat) in spec.stat_columns.iter().enumerate() {
        for metric in &metrics {
            let label = spec.rename_map.get(metric).unwrap_or(metric);
            let name = format!("{label}_{stat}");
            let values: Vec<Option<String>> = order
                .iter()
                .map(|&slot| {
                    cell_values
                        .get(&(slot, metric.clone(), stat_idx))
                        .filter(|v| !v.is_empty())
                        .cloned()
                })
                .collect();
            columns.push(typed_column(&name, values));
        }
    }

    Ok(DataFrame::new(columns)?)
}

/// Numeric column when every present value parses as a number, string
/// otherwise.
fn typed_column(name: &str, values: Vec<Option<String>>) -> Column {
    let mut numbers = Vec::with_capacity(values.len());
    let mut all_numeric = false;
    for value in &values {
        match value {
            None => numbers.push(None),
            Some(v) => match parse_f64(v) {
                Some(n) => {
                    numbers.push(Some(n));
                    all_numeric = true;
                }
                None => {
                    all_numeric = false;
                    break;
                }
            },
        }
    }
    if all_numeric && numbers.len() == values.len() {
        Column::new(name.into(), numbers)
    } else {
        Column::new(name.into(), values)
    }
}

fn compare_keys(a: &[String], b: &[String]) -> Ordering {
    for (left, right) in a.iter().zip(b.iter()) {
        let ordering = match (parse_f64(left), parse_f64(right)) {
            (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
            _ => left.cmp(right),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

fn resolve_one(frame: &DataFrame, wanted: &str) -> Result<String> {
    crate::eval::resolve_column_name(frame, wanted)
        .ok_or_else(|| anyhow!("reshape column '{wanted}' not present in the source table"))
}

fn resolve_all(frame: &DataFrame, wanted: &[String]) -> Result<Vec<String>> {
    wanted.iter().map(|name| resolve_one(frame, name)).collect()
}

fn cells_of(frame: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = frame.column(name)?;
    Ok((0..column.len())
        .map(|idx| column.get(idx).map(any_to_string).unwrap_or_default())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_utils::any_to_f64;

    fn long_frame() -> DataFrame {
        let metrics = [
            ("0", "Active Sessions", "15", "20", "22"),
            ("1", "Active Sessions", "14", "18", "19"),
            ("2", "Active Sessions", "13", "18", "18"),
            ("0", "User Transaction Per Sec", "369", "450", "460"),
            ("1", "User Transaction Per Sec", "301", "400", "420"),
            ("2", "User Transaction Per Sec", "280", "390", "400"),
            ("0", "Physical Reads", "904", "1405", "1500"),
            ("1", "Physical Reads", "1050", "1589", "1600"),
            ("2", "Physical Reads", "1120", "1400", "1450"),
        ];
        DataFrame::new(vec![
            Column::new("DBID".into(), vec!["1"; 9]),
            Column::new(
                "HOUR".into(),
                metrics.iter().map(|m| m.0).collect::<Vec<_>>(),
            ),
            Column::new(
                "METRIC".into(),
                metrics.iter().map(|m| m.1).collect::<Vec<_>>(),
            ),
            Column::new(
                "PERC50".into(),
                metrics.iter().map(|m| m.2).collect::<Vec<_>>(),
            ),
            Column::new(
                "PERC90".into(),
                metrics.iter().map(|m| m.3).collect::<Vec<_>>(),
            ),
            Column::new(
                "PERC95".into(),
                metrics.iter().map(|m| m.4).collect::<Vec<_>>(),
            ),
        ])
        .unwrap()
    }

    fn spec() -> ReshapeSpec {
        ReshapeSpec {
            index_columns: vec!["DBID".to_string(), "HOUR".to_string()],
            target_column: "METRIC".to_string(),
            stat_columns: vec!["PERC90".to_string(), "PERC95".to_string()],
            filter_rows: false,
            rename_map: BTreeMap::from([(
                "Active Sessions".to_string(),
                "AAS".to_string(),
            )]),
            store: None,
        }
    }

    #[test]
    fn worked_example_pivots_to_three_rows() {
        let wide = reshape(&long_frame(), &spec()).unwrap();
        assert_eq!(wide.height(), 3);
        let names: Vec<String> = wide
            .get_columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "DBID",
                "HOUR",
                "AAS_PERC90",
                "Physical Reads_PERC90",
                "User Transaction Per Sec_PERC90",
                "AAS_PERC95",
                "Physical Reads_PERC95",
                "User Transaction Per Sec_PERC95",
            ]
        );
        // HOUR=0 is the first row after the numeric-aware sort
        let aas = wide.column("AAS_PERC90").unwrap();
        assert_eq!(any_to_f64(aas.get(0).unwrap()), Some(20.0));
    }

    #[test]
    fn filtering_keeps_only_renamed_metrics() {
        let mut filtered_spec = spec();
        filtered_spec.filter_rows = true;
        let wide = reshape(&long_frame(), &filtered_spec).unwrap();
        assert_eq!(wide.height(), 3);
        assert_eq!(wide.width(), 4); // DBID, HOUR, AAS_PERC90, AAS_PERC95
    }

    #[test]
    fn filtering_everything_yields_an_empty_table() {
        let mut empty_spec = spec();
        empty_spec.filter_rows = true;
        empty_spec.rename_map = BTreeMap::from([("No Such Metric".to_string(), "X".to_string())]);
        let wide = reshape(&long_frame(), &empty_spec).unwrap();
        assert_eq!(wide.height(), 0);
        assert_eq!(wide.width(), 2);
    }

    #[test]
    fn empty_input_is_identity() {
        let empty = long_frame().head(Some(0));
        let wide = reshape(&empty, &spec()).unwrap();
        assert_eq!(wide.height(), 0);
        assert_eq!(wide.width(), 6);
    }

    #[test]
    fn duplicate_index_metric_pairs_are_rejected() {
        let frame = DataFrame::new(vec![
            Column::new("HOUR".into(), vec!["0", "0"]),
            Column::new("METRIC".into(), vec!["Active Sessions"; 2]),
            Column::new("PERC90".into(), vec!["20", "21"]),
        ])
        .unwrap();
        let dup_spec = ReshapeSpec {
            index_columns: vec!["HOUR".to_string()],
            target_column: "METRIC".to_string(),
            stat_columns: vec!["PERC90".to_string()],
            ..ReshapeSpec::default()
        };
        assert!(reshape(&frame, &dup_spec).is_err());
    }

    #[test]
    fn spec_parses_from_a_variable_map() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{
                "INDEX_COLUMNS": ["DBID", "HOUR"],
                "TARGET_COLUMN": "METRIC",
                "TARGET_STATS_COLUMNS": ["PERC90", "PERC95"],
                "filterrows": "YES",
                "from_to_rows_to_columns": {"Active Sessions": "AAS"},
                "store": "CSV_ONLY"
            }"#,
        )
        .unwrap();
        let value = Value::from_json(&json);
        let parsed = ReshapeSpec::from_value(&value).unwrap();
        assert_eq!(parsed.index_columns, vec!["DBID", "HOUR"]);
        assert!(parsed.filter_rows);
        assert_eq!(parsed.rename_map.get("Active Sessions").unwrap(), "AAS");
        assert_eq!(parsed.store.as_deref(), Some("CSV_ONLY"));
    }
}
