//! End-to-end ingestion: discovery filters, validation, parsing, registry
//! placement, and schema reconciliation.

use std::path::PathBuf;

use tracing::{info, warn};

use dbma_model::{Parameters, SchemaMode, SchemaRegistry};

use crate::discovery::{DERIVED_KIND, artifact_kind, table_name};
use crate::error::Result;
use crate::reader::{ReadOptions, read_extract};
use crate::registry::TableRegistry;
use crate::validate::validate_extract;

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub read: ReadOptions,
    pub schema_mode: SchemaMode,
    /// Append same-shaped tables from multiple collections instead of
    /// replacing the earlier one.
    pub consolidate_tables: bool,
    pub skip_validation: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            read: ReadOptions::default(),
            schema_mode: SchemaMode::default(),
            consolidate_tables: false,
            skip_validation: false,
        }
    }
}

/// What happened to each discovered file. Invalid files are reported at the
/// end of the run; only I/O-level discovery failures abort it.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub loaded: Vec<(String, PathBuf)>,
    pub skipped: Vec<(PathBuf, String)>,
    pub invalid: Vec<(PathBuf, String)>,
}

/// Load every extract in `files` into the registry. Files are processed in
/// name order so repeated table names resolve deterministically.
pub fn ingest_files(
    files: &[PathBuf],
    options: IngestOptions,
    parameters: &Parameters,
    schema: &mut SchemaRegistry,
    registry: &mut TableRegistry,
) -> Result<IngestReport> {
    let mut ordered: Vec<PathBuf> = files.to_vec();
    ordered.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut report = IngestReport::default();
    for path in &ordered {
        if artifact_kind(path).as_deref() == Some(DERIVED_KIND) {
            report
                .skipped
                .push((path.clone(), "produced by a previous run".to_string()));
            continue;
        }
        let Some(table) = table_name(path) else {
            warn!(path = %path.display(), "file name does not follow the extract convention");
            report
                .skipped
                .push((path.clone(), "unrecognized file name".to_string()));
            continue;
        };
        if !parameters.should_import(&table) {
            info!(table = %table, "skipping table excluded by do_not_import");
            report
                .skipped
                .push((path.clone(), format!("table {table} excluded by do_not_import")));
            continue;
        }

        if !options.skip_validation
            && let Some(reason) = validate_extract(path, options.read.skip_rows)
        {
            info!(path = %path.display(), reason = %reason, "extract failed validation");
            report.invalid.push((path.clone(), reason));
            continue;
        }

        let headers = schema.headers(&table);
        let frame = match read_extract(path, options.read, headers.as_deref()) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "extract could not be parsed");
                report.invalid.push((path.clone(), err.to_string()));
                continue;
            }
        };

        let observed: Vec<String> = frame
            .get_columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        info!(table = %table, rows = frame.height(), "loaded extract");
        if options.consolidate_tables {
            registry.concat_or_replace(&table, frame);
        } else {
            registry.insert(&table, frame);
        }
        schema.reconcile(options.schema_mode, &table, &observed);
        report.loaded.push((table.to_uppercase(), path.clone()));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn options() -> IngestOptions {
        IngestOptions {
            read: ReadOptions {
                skip_rows: 1,
                delimiter: b';',
            },
            ..IngestOptions::default()
        }
    }

    #[test]
    fn loads_valid_extracts_and_reports_the_rest() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write(&dir, "opdb__dbsummary__121_2.0.3_x.csv", "\nPKEY;DBID\nk1;1\n"),
            write(&dir, "opdbt__derived__121_2.0.3_x.csv", "\nA\n1\n"),
            write(&dir, "opdb__opkeylog__121_2.0.3_x.csv", "\nA\n1\n"),
            write(&dir, "opdb__empty__121_2.0.3_x.csv", "\nA\n"),
        ];
        let parameters = Parameters {
            do_not_import: vec!["opkeylog".to_string()],
            ..Parameters::default()
        };
        let mut schema = SchemaRegistry::new();
        let mut registry = TableRegistry::new();
        let report =
            ingest_files(&files, options(), &parameters, &mut schema, &mut registry).unwrap();

        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.loaded[0].0, "DBSUMMARY");
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.invalid[0].1, "File seems to be Empty");
        assert!(registry.contains("DBSUMMARY"));
        assert!(!registry.contains("DERIVED"));
        // FILLGAP picked up the observed columns
        assert_eq!(schema.headers("dbsummary").unwrap(), vec!["PKEY", "DBID"]);
    }

    #[test]
    fn configured_headers_win_over_in_file_ones() {
        let dir = TempDir::new().unwrap();
        let files = vec![write(
            &dir,
            "opdb__dbsummary__121_2.0.3_x.csv",
            "\nwhatever;names\nk1;1\n",
        )];
        let mut schema = SchemaRegistry::new();
        schema.insert(
            "dbsummary",
            vec![
                dbma_model::ColumnSpec::from(("PKEY".to_string(), "STRING".to_string())),
                dbma_model::ColumnSpec::from(("DBID".to_string(), "STRING".to_string())),
            ],
        );
        let mut registry = TableRegistry::new();
        let report = ingest_files(
            &files,
            options(),
            &Parameters::default(),
            &mut schema,
            &mut registry,
        )
        .unwrap();
        assert_eq!(report.loaded.len(), 1);
        assert!(registry.get("dbsummary").unwrap().column("PKEY").is_ok());
    }

    #[test]
    fn consolidation_appends_across_collections() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write(&dir, "opdb__dbsummary__121_2.0.3_a.csv", "\nPKEY\nk1\n"),
            write(&dir, "opdb__dbsummary__121_2.0.3_b.csv", "\nPKEY\nk2\n"),
        ];
        let mut schema = SchemaRegistry::new();
        let mut registry = TableRegistry::new();
        let opts = IngestOptions {
            consolidate_tables: true,
            ..options()
        };
        ingest_files(&files, opts, &Parameters::default(), &mut schema, &mut registry).unwrap();
        assert_eq!(registry.get("dbsummary").unwrap().height(), 2);
    }
}
