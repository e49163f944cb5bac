//! Produced-file CSV emission.
//!
//! Every table a rule materializes is written back next to the collector
//! extracts under the `opdbt` artifact marker, so a later consolidation run
//! can tell engine output from raw collector output. Emitted files open with
//! one blank sentinel line to keep skip-row counts uniform with raw extracts.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use tracing::info;

use dbma_ingest::DERIVED_KIND;
use dbma_model::{SchemaMode, SchemaRegistry};

use crate::data_utils::any_to_string;

/// Stores that materialize a CSV; anything else keeps the table in-memory
/// only.
const CSV_STORES: [&str; 2] = ["CSV_ONLY", "BIGQUERY"];

#[derive(Debug, Clone)]
pub struct EmitOptions {
    pub files_location: PathBuf,
    /// Collection key including its `.csv` suffix, reused verbatim so produced
    /// files sort next to their source extracts.
    pub collection_key: String,
    pub delimiter: u8,
}

impl EmitOptions {
    pub fn produced_file_name(&self, table: &str) -> PathBuf {
        self.files_location.join(format!(
            "{DERIVED_KIND}__{}__{}",
            table.to_lowercase(),
            self.collection_key
        ))
    }
}

/// Emit `frame` for `table` when its store requests a file.
///
/// The schema entry for the table is always regenerated AUTO at this point:
/// rule output column order is only known once the frame exists. Returns the
/// written path, or `None` when the store keeps the table in-memory.
pub fn emit_table(
    frame: &DataFrame,
    table: &str,
    store: Option<&str>,
    options: &EmitOptions,
    schema: &mut SchemaRegistry,
) -> Result<Option<PathBuf>> {
    let store = store.unwrap_or("CSV_ONLY");
    if !CSV_STORES.contains(&store.to_uppercase().as_str()) {
        return Ok(None);
    }

    let observed: Vec<String> = frame
        .get_columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    schema.reconcile(SchemaMode::Auto, &table.to_lowercase(), &observed);

    let path = options.produced_file_name(table);
    write_table_csv(&path, frame, options.delimiter)?;
    info!(table = %table, path = %path.display(), "materialized table");
    Ok(Some(path))
}

/// Write a frame as `<blank line>\n<header>\n<rows...>` with the run's
/// separator. Nulls render as empty cells.
pub fn write_table_csv(path: &Path, frame: &DataFrame, delimiter: u8) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("create {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("write sentinel line to {}", path.display()))?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(file);
    let headers: Vec<String> = frame
        .get_columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    writer.write_record(&headers)?;
    for row in 0..frame.height() {
        let record: Vec<String> = frame
            .get_columns()
            .iter()
            .map(|column| column.get(row).map(any_to_string).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::Column;
    use tempfile::TempDir;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("PKEY".into(), vec![Some("k1"), Some("k2")]),
            Column::new("VALUE".into(), vec![Some("1"), None]),
        ])
        .unwrap()
    }

    fn options(dir: &TempDir) -> EmitOptions {
        EmitOptions {
            files_location: dir.path().to_path_buf(),
            collection_key: "121_2.0.3_host.db.20220131.csv".to_string(),
            delimiter: b';',
        }
    }

    #[test]
    fn produced_files_carry_the_derived_marker() {
        let dir = TempDir::new().unwrap();
        let path = options(&dir).produced_file_name("DBSUMMARY_RS");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name, "opdbt__dbsummary_rs__121_2.0.3_host.db.20220131.csv");
    }

    #[test]
    fn emitted_file_starts_with_a_blank_sentinel_line() {
        let dir = TempDir::new().unwrap();
        let mut schema = SchemaRegistry::new();
        let path = emit_table(&frame(), "t", Some("CSV_ONLY"), &options(&dir), &mut schema)
            .unwrap()
            .unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "PKEY;VALUE");
        assert_eq!(lines[2], "k1;1");
        assert_eq!(lines[3], "k2;");
    }

    #[test]
    fn emission_regenerates_the_schema_entry() {
        let dir = TempDir::new().unwrap();
        let mut schema = SchemaRegistry::new();
        schema.insert(
            "t",
            vec![dbma_model::ColumnSpec::from((
                "STALE".to_string(),
                "NUMERIC".to_string(),
            ))],
        );
        emit_table(&frame(), "T", Some("BIGQUERY"), &options(&dir), &mut schema).unwrap();
        assert_eq!(schema.headers("t").unwrap(), vec!["PKEY", "VALUE"]);
    }

    #[test]
    fn non_csv_stores_skip_the_file() {
        let dir = TempDir::new().unwrap();
        let mut schema = SchemaRegistry::new();
        let written =
            emit_table(&frame(), "t", Some("MEMORY"), &options(&dir), &mut schema).unwrap();
        assert!(written.is_none());
    }
}
