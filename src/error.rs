use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::ExecutionStatus;

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("No query targets were supplied")]
    NotConfigured,

    #[error("Failed to create notebook execution ({status}): {message}")]
    SubmissionError { status: u16, message: String },

    #[error("{}", .exception.as_deref().unwrap_or("The notebook failed to execute."))]
    ExecutionFailed {
        status: ExecutionStatus,
        exception: Option<String>,
    },

    #[error("Execution {id} did not finish after {attempts} status checks")]
    PollTimeout { id: String, attempts: u32 },

    #[error("Notebook result does not match the expected schema: {0}")]
    SchemaMismatch(String),

    #[error("Output {output} was not found in the notebook result")]
    OutputNotFound { output: String },

    #[error("Unrecognized notebook result format: {0}")]
    UnrecognizedResultFormat(String),

    #[error("Malformed notebook result: {0}")]
    MalformedResult(String),

    #[error("Request to notebook service failed: {message}")]
    Transport { status: Option<u16>, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for DataSourceError {
    fn from(err: reqwest::Error) -> Self {
        DataSourceError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for DataSourceError {
    fn from(rejection: JsonRejection) -> Self {
        DataSourceError::Serialization(rejection.body_text())
    }
}

impl From<serde_json::Error> for DataSourceError {
    fn from(err: serde_json::Error) -> Self {
        DataSourceError::Serialization(err.to_string())
    }
}

impl IntoResponse for DataSourceError {
    fn into_response(self) -> Response {
        let status = match &self {
            DataSourceError::NotConfigured => StatusCode::BAD_REQUEST,
            DataSourceError::Serialization(_) => StatusCode::BAD_REQUEST,
            DataSourceError::OutputNotFound { .. } => StatusCode::NOT_FOUND,
            DataSourceError::SubmissionError { .. } | DataSourceError::Transport { .. } => {
                StatusCode::BAD_GATEWAY
            }
            DataSourceError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            DataSourceError::ExecutionFailed { .. }
            | DataSourceError::SchemaMismatch(_)
            | DataSourceError::UnrecognizedResultFormat(_)
            | DataSourceError::MalformedResult(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DataSourceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, DataSourceError>;
