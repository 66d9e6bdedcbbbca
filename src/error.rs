//! HTTP error taxonomy and the JSON error envelope.

use crate::ocr::OcrError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors a request handler can end in.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Client-correctable input problem (bad image, bad bbox type).
    #[error("{0}")]
    InvalidInput(String),

    /// The body could not be read or deserialized as JSON. Reported as 400,
    /// except an oversized body which keeps its 413.
    #[error("{0}")]
    Body(#[from] JsonRejection),

    #[error("Failed to stage image: {0}")]
    Staging(#[source] std::io::Error),

    #[error("{0}")]
    Recognition(#[from] OcrError),

    #[error("Failed to read OCR output: {0}")]
    ResultRead(#[source] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Anything that escaped the handlers. Detail stays in the logs.
    #[error("Internal server error")]
    Unhandled,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Body(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::Body(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Staging(_)
            | ApiError::Recognition(_)
            | ApiError::ResultRead(_)
            | ApiError::Unhandled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

/// `{ "success": false, "error": { "message": ... } }`
#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        let body = Json(ErrorEnvelope {
            success: false,
            error: ErrorBody {
                message: self.to_string(),
            },
        });

        (status, body).into_response()
    }
}
