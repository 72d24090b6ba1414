use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Failure of one identifier or copy workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Redcap(#[from] ndd_redcap::RedcapError),

    #[error(transparent)]
    Labkey(#[from] ndd_labkey::LabkeyError),

    #[error(transparent)]
    Core(#[from] ndd_core::CoreError),

    #[error("{project} record {record} not found")]
    MissingRecord {
        project: &'static str,
        record: String,
    },

    #[error("record {record} has no {field}")]
    MissingField { record: String, field: &'static str },

    #[error("record {record} has no family member instance {instance}")]
    MissingMember { record: String, instance: String },

    #[error("invalid {field} {value:?} on record {record}")]
    InvalidValue {
        record: String,
        field: &'static str,
        value: String,
    },

    #[error("sample submission {0} appears more than once")]
    DuplicateSubmission(String),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Error body returned by every route.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    BadGateway(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::BadGateway(msg) => {
                tracing::error!("upstream error: {msg}");
                (StatusCode::BAD_GATEWAY, msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::MissingRecord { .. } | WorkflowError::MissingMember { .. } => {
                ApiError::NotFound(err.to_string())
            }
            WorkflowError::MissingField { .. }
            | WorkflowError::InvalidValue { .. }
            | WorkflowError::DuplicateSubmission(_) => ApiError::BadRequest(err.to_string()),
            WorkflowError::Redcap(_) | WorkflowError::Labkey(_) => {
                ApiError::BadGateway(err.to_string())
            }
            WorkflowError::Core(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// Failure to start or run the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server stopped: {0}")]
    Serve(#[source] std::io::Error),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}
