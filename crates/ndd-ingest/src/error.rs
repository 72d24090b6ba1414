use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read delimited file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read workbook {path}: {message}")]
    Excel { path: PathBuf, message: String },

    #[error("workbook {0} has no worksheets")]
    EmptyWorkbook(PathBuf),

    #[error("unsupported file type: {0} (expected .csv, .tsv, .tab, .xls or .xlsx)")]
    UnsupportedFormat(PathBuf),

    #[error(transparent)]
    Model(#[from] ndd_model::ModelError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
