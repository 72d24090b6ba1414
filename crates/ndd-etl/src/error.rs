use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error(transparent)]
    Redcap(#[from] ndd_redcap::RedcapError),

    /// Newly assigned subject ids could not be stored; the run must stop.
    #[error("could not write assigned subject ids back to REDCap: {source}")]
    WriteBack {
        #[source]
        source: ndd_redcap::RedcapError,
    },

    #[error(transparent)]
    Labkey(#[from] ndd_labkey::LabkeyError),

    #[error(transparent)]
    Ingest(#[from] ndd_ingest::IngestError),

    #[error(transparent)]
    Decode(#[from] ndd_core::CoreError),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write archive {path}: {message}")]
    Zip { path: PathBuf, message: String },

    #[error("instrument {instrument} is configured for unknown event {event}")]
    UnknownEvent { instrument: String, event: String },

    #[error("table {table} lists unconfigured instrument {instrument}")]
    MissingInstrument { table: String, instrument: String },

    #[error("study instrument {0} has no date column configured")]
    MissingDateColumn(String),

    #[error("no study archive path configured")]
    NoArchivePath,
}

pub(crate) fn io_error(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> EtlError {
    let path = path.into();
    move |source| EtlError::Io { path, source }
}

pub type Result<T> = std::result::Result<T, EtlError>;
