//! Error types for REDCap API calls.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RedcapError {
    /// Transport failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// REDCap answered with a non-success status.
    #[error("REDCap returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse REDCap CSV response: {0}")]
    Csv(String),

    #[error("failed to encode records as JSON: {0}")]
    Json(String),

    /// A response that parsed but did not have the expected shape.
    #[error("unexpected REDCap response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Model(#[from] ndd_model::ModelError),
}

impl RedcapError {
    /// Whether the server rejected the request, as opposed to never answering.
    #[must_use]
    pub fn is_status(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}

impl From<reqwest::Error> for RedcapError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<csv::Error> for RedcapError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for RedcapError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RedcapError>;
