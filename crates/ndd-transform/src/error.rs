use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Ingest(#[from] ndd_ingest::IngestError),

    #[error(transparent)]
    Redcap(#[from] ndd_redcap::RedcapError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} has no {column} column")]
    MissingColumn { path: PathBuf, column: String },
}

pub type Result<T> = std::result::Result<T, TransformError>;
