//! CSV extract reader.
//!
//! Extracts are read as all-string frames: typing is the warehouse loader's
//! concern, and collector output is too irregular to trust inference. When the
//! schema registry carries headers for the table, the in-file header row is
//! skipped and the configured names win; otherwise the first row after the
//! banner lines is cleaned up and used as the header.

use std::path::Path;

use csv::ReaderBuilder;
use polars::prelude::{Column, DataFrame};
use tracing::debug;

use dbma_model::clean_header;

use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Banner lines before the header row. Raw collector extracts lead with
    /// one blank sentinel line; engine-produced files re-read in a
    /// consolidation run have none.
    pub skip_rows: usize,
    pub delimiter: u8,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            skip_rows: 1,
            delimiter: b';',
        }
    }
}

/// Collector scripts before 2.0.5 wrote comma-separated extracts; later ones
/// default to semicolons.
pub fn delimiter_for(collection_version: &str, configured: u8) -> u8 {
    match collection_version.replace('.', "").parse::<u32>() {
        Ok(digits) if digits < 205 => b',',
        _ => configured,
    }
}

/// Read one extract into a string-typed frame. Empty cells and the literal
/// `n/a` become nulls.
pub fn read_extract(
    path: &Path,
    options: ReadOptions,
    configured_headers: Option<&[String]>,
) -> Result<DataFrame> {
    let raw = std::fs::read_to_string(path).map_err(|e| IngestError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let lines: Vec<&str> = raw.lines().collect();
    let body = lines[options.skip_rows.min(lines.len())..].join("\n");

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(options.delimiter)
        .from_reader(body.as_bytes());
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| IngestError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        let row: Vec<String> = record
            .iter()
            .map(|cell| cell.trim_matches('\u{feff}').trim().to_string())
            .collect();
        if row.iter().all(String::is_empty) {
            continue;
        }
        rows.push(row);
    }

    if let Some(configured) = configured_headers.filter(|headers| !headers.is_empty()) {
        let headers: Vec<String> = configured.iter().map(|h| h.to_uppercase()).collect();
        let data = rows.get(1..).unwrap_or_default();
        let fits = data.iter().all(|row| row.len() <= headers.len());
        if fits {
            return build_frame(path, &headers, data);
        }
        debug!(
            path = %path.display(),
            "rows wider than the configured schema; falling back to in-file headers"
        );
    }

    let Some((header_row, data)) = rows.split_first() else {
        return Err(IngestError::EmptyFile {
            path: path.to_path_buf(),
        });
    };
    let headers = dedupe(header_row.iter().map(|h| clean_header(h)).collect());
    build_frame(path, &headers, data)
}

fn build_frame(path: &Path, headers: &[String], data: &[Vec<String>]) -> Result<DataFrame> {
    if data.is_empty() {
        return Err(IngestError::EmptyFile {
            path: path.to_path_buf(),
        });
    }
    let mut columns = Vec::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        let values: Vec<Option<String>> = data
            .iter()
            .map(|row| {
                let cell = row.get(idx).map(String::as_str).unwrap_or("");
                if cell.is_empty() || cell.eq_ignore_ascii_case("n/a") {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        columns.push(Column::new(header.as_str().into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

fn dedupe(headers: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::BTreeMap::new();
    headers
        .into_iter()
        .map(|header| {
            let count = seen.entry(header.clone()).or_insert(0usize);
            *count += 1;
            if *count == 1 {
                header
            } else {
                format!("{header}_{}", *count - 1)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("opdb__dbsummary__121_2.0.3_x.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn options() -> ReadOptions {
        ReadOptions {
            skip_rows: 1,
            delimiter: b';',
        }
    }

    #[test]
    fn configured_headers_replace_the_in_file_row() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "\npkey;dbid\nk1;101\nk2;n/a\n");
        let configured = vec!["PKEY".to_string(), "DBID".to_string()];
        let frame = read_extract(&path, options(), Some(&configured)).unwrap();
        assert_eq!(frame.height(), 2);
        assert!(frame.column("PKEY").is_ok());
        assert_eq!(frame.column("DBID").unwrap().null_count(), 1);
    }

    #[test]
    fn falls_back_to_cleaned_file_headers() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "\n'||HOST_NAME||';\"DB ID\"\nhost1;101\n");
        let frame = read_extract(&path, options(), None).unwrap();
        assert!(frame.column("HOST_NAME").is_ok());
        assert!(frame.column("DBID").is_ok());
    }

    #[test]
    fn wider_rows_fall_back_to_file_headers() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "\nA;B;C\n1;2;3\n");
        let configured = vec!["ONLY".to_string()];
        let frame = read_extract(&path, options(), Some(&configured)).unwrap();
        assert_eq!(frame.width(), 3);
    }

    #[test]
    fn short_rows_pad_with_nulls() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "\nA;B\n1\n2;3\n");
        let frame = read_extract(&path, options(), None).unwrap();
        assert_eq!(frame.column("B").unwrap().null_count(), 1);
    }

    #[test]
    fn no_data_rows_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "\nA;B\n");
        assert!(matches!(
            read_extract(&path, options(), None),
            Err(IngestError::EmptyFile { .. })
        ));
    }

    #[test]
    fn old_collections_force_commas() {
        assert_eq!(delimiter_for("2.0.3", b';'), b',');
        assert_eq!(delimiter_for("2.0.5", b';'), b';');
        assert_eq!(delimiter_for("garbage", b';'), b';');
    }
}
