use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("failed to read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no extract files found matching '{pattern}'")]
    NoFilesFound { pattern: String },

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("extract file {path} contains no data rows")]
    EmptyFile { path: PathBuf },

    #[error("extract files mix 11.x database versions with later ones; split the run per version")]
    MixedLegacyDbVersions,

    #[error("extract files carry more than one collector script version: {0:?}")]
    MultipleScriptVersions(Vec<String>),

    #[error(transparent)]
    Frame(#[from] polars::error::PolarsError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
