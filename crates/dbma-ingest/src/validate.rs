//! Pre-ingestion validity checks on raw extract files.
//!
//! Each check yields a human-readable reason string; a file with a reason is
//! reported and skipped, never aborting the run.

use std::path::Path;

/// Validate a raw extract before parsing. `skip_rows` counts leading banner
/// lines (the blank sentinel line collectors emit) that precede the header.
/// Returns `None` when the file is ingestible.
pub fn validate_extract(path: &Path, skip_rows: usize) -> Option<String> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Some("File seems to be of improper format".to_string());
    };

    let lines: Vec<&str> = raw.lines().collect();
    let data_rows = lines
        .iter()
        .skip(skip_rows + 1)
        .filter(|line| !line.trim().is_empty())
        .count();
    if data_rows == 0 {
        return Some("File seems to be Empty".to_string());
    }

    let mut reason = None;
    if lines.iter().any(|line| line.starts_with("ORA-")) {
        reason = Some("File has ORA-Errors".to_string());
    }
    let last_line = lines
        .iter()
        .rev()
        .find(|line| !line.trim().is_empty())
        .copied()
        .unwrap_or("");
    if last_line.starts_with("Elapsed:") {
        reason = Some(
            "File has Elapsed time message from Oracle, Please remove the message and reprocess"
                .to_string(),
        );
    }
    reason
}
