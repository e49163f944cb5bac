//! Extract-file discovery and file-name token parsing.
//!
//! Collector output follows `<kind>__<table>__<collection key>.csv`, where the
//! collection key is `<dbVersion>_<scriptVersion>_<host>.<db>.<timestamp>`.
//! Files the engine itself produced carry the `opdbt` kind token and are never
//! re-ingested.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

/// Kind token on engine-produced artifacts.
pub const DERIVED_KIND: &str = "opdbt";

const TOKEN_DELIMITER: &str = "__";

/// Lists extract files in `dir` whose names end with `<collection_id>.csv`,
/// sorted by file name. An empty result is fatal for the run.
pub fn list_extract_files(dir: &Path, collection_id: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let suffix = format!("{}.csv", collection_id.trim());
    let mut files = Vec::new();

    let entries = std::fs::read_dir(dir).map_err(|e| IngestError::DirectoryRead {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry_result in entries {
        let entry = entry_result.map_err(|e| IngestError::DirectoryRead {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(&suffix));
        if matches {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(IngestError::NoFilesFound {
            pattern: format!("{}/*{suffix}", dir.display()),
        });
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Positional `__`-delimited token of a file's base name, extension stripped
/// from the last token.
pub fn filename_token(path: &Path, pos: usize) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let tokens: Vec<&str> = name.split(TOKEN_DELIMITER).collect();
    let token = tokens.get(pos)?;
    let token = if pos == tokens.len() - 1 {
        token.strip_suffix(".csv").unwrap_or(token)
    } else {
        token
    };
    Some(token.to_string())
}

/// Artifact kind token (`opdb`, `opdbt`, ...).
pub fn artifact_kind(path: &Path) -> Option<String> {
    filename_token(path, 0)
}

/// Target table name token.
pub fn table_name(path: &Path) -> Option<String> {
    filename_token(path, 1)
}

/// Collection key token: `<dbVersion>_<scriptVersion>_<suffix>`.
pub fn collection_key(path: &Path) -> Option<String> {
    filename_token(path, 2)
}

pub fn db_version_of_key(collection_key: &str) -> Option<String> {
    collection_key
        .split('_')
        .next()
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn script_version_of_key(collection_key: &str) -> Option<String> {
    collection_key.split('_').nth(1).map(str::to_string)
}

/// A run may not mix 11.x extracts with later-version extracts: their column
/// layouts differ and a single schema baseline cannot cover both.
pub fn ensure_consistent_db_versions(files: &[PathBuf]) -> Result<()> {
    let mut legacy = false;
    let mut modern = false;
    for file in files {
        let Some(version) = collection_key(file).and_then(|key| db_version_of_key(&key)) else {
            continue;
        };
        if version == "111" || version == "112" {
            legacy = true;
        } else {
            modern = true;
        }
    }
    if legacy && modern {
        return Err(IngestError::MixedLegacyDbVersions);
    }
    Ok(())
}

/// All extracts in a run must come from the same collector script version.
pub fn ensure_single_script_version(files: &[PathBuf]) -> Result<String> {
    let versions: BTreeSet<String> = files
        .iter()
        .filter_map(|file| collection_key(file).and_then(|key| script_version_of_key(&key)))
        .collect();
    match versions.len() {
        1 => Ok(versions.into_iter().next().unwrap_or_default()),
        _ => Err(IngestError::MultipleScriptVersions(
            versions.into_iter().collect(),
        )),
    }
}
