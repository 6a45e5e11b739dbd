//! Custom error types for the media information service

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::downloader::DownloadError;
use crate::models::ErrorResponse;
use crate::prober::ProbeError;

/// Failure of a probe request, converted to `{"error": ...}` at the boundary
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed body or missing/invalid `media_url`
    #[error("{0}")]
    InvalidInput(String),

    /// The media file could not be fetched
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// ffprobe could not be run or exited non-zero
    #[error("FFprobe analysis failed: {0}")]
    Probe(#[from] ProbeError),

    /// ffprobe succeeded but printed something that is not a probe report
    #[error("Failed to parse FFprobe JSON output: {source}")]
    MalformedOutput {
        #[source]
        source: serde_json::Error,
        raw_output: String,
    },

    /// The overall processing budget ran out
    #[error("Processing time limit of {} seconds exceeded", .0.as_secs())]
    TimedOut(Duration),

    /// Any verb other than GET and POST
    #[error("Method not allowed. Use GET for documentation or POST with JSON body.")]
    MethodNotAllowed,
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Download(DownloadError::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
            ServiceError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServiceError::Download(_)
            | ServiceError::Probe(_)
            | ServiceError::MalformedOutput { .. }
            | ServiceError::TimedOut(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short name of the failure kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) | ServiceError::Download(DownloadError::InvalidUrl(_)) => {
                "invalid_input"
            }
            ServiceError::Download(_) => "download_failed",
            ServiceError::Probe(_) => "probe_failed",
            ServiceError::MalformedOutput { .. } => "malformed_output",
            ServiceError::TimedOut(_) => "timed_out",
            ServiceError::MethodNotAllowed => "method_not_allowed",
        }
    }

    /// Server-side diagnostic text. Never sent to the client.
    pub fn detail(&self) -> Option<String> {
        match self {
            ServiceError::Download(e) => Some(e.detail()),
            ServiceError::Probe(e) => Some(e.detail()),
            ServiceError::MalformedOutput { raw_output, .. } => {
                Some(format!("Raw output: {}", raw_output))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(kind = self.kind(), "Request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Type alias for service results
pub type ServiceResult<T> = Result<T, ServiceError>;
