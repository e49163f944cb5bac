use std::path::PathBuf;

use dbma_model::RuleOutcomes;

#[derive(Debug)]
pub struct ImportResult {
    pub collection_key: String,
    pub db_version: String,
    pub collection_version: String,
    pub ingested: Vec<(String, PathBuf)>,
    pub skipped: Vec<(PathBuf, String)>,
    pub invalid: Vec<(PathBuf, String)>,
    pub outcomes: RuleOutcomes,
    pub produced_files: Vec<PathBuf>,
    /// Tables handed to the warehouse loader.
    pub handoff: Vec<(String, PathBuf)>,
    pub views: Vec<String>,
    pub has_failures: bool,
}
