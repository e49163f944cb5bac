//! Extract discovery, validation, and CSV ingestion.

#![deny(unsafe_code)]

pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod validate;

pub use discovery::{
    DERIVED_KIND, artifact_kind, collection_key, db_version_of_key, ensure_consistent_db_versions,
    ensure_single_script_version, filename_token, list_extract_files, script_version_of_key,
    table_name,
};
pub use error::{IngestError, Result};
pub use pipeline::{IngestOptions, IngestReport, ingest_files};
pub use reader::{ReadOptions, delimiter_for, read_extract};
pub use registry::TableRegistry;
pub use validate::validate_extract;
