//! Error types for LabKey query API calls.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LabkeyError {
    #[error("network error: {0}")]
    Network(String),

    /// LabKey answered with a non-success status; `exception` is its message when present.
    #[error("LabKey {schema}.{query} returned {status}: {exception}")]
    Status {
        schema: String,
        query: String,
        status: u16,
        exception: String,
    },

    #[error("JSON error: {0}")]
    Json(String),

    #[error("unexpected LabKey response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for LabkeyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for LabkeyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LabkeyError>;
