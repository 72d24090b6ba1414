use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("duplicate field in data dictionary: {0}")]
    DuplicateField(String),

    #[error("invalid F-number: {0:?}")]
    InvalidFNumber(String),

    #[error("invalid individual number: {0:?}")]
    InvalidIndividualNumber(String),

    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
