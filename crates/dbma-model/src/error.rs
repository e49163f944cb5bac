use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
    #[error(
        "no table schema configured for collection_version={collection_version} and db_version={db_version}"
    )]
    SchemaNotFound {
        collection_version: String,
        db_version: String,
    },
    #[error("invalid version string: {0:?}")]
    InvalidVersion(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
