//! API error types.

use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// API error type.
///
/// Every variant renders as a plain-text body. Server-side failures are
/// logged with their detail and answered with a generic message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Absent and expired entries share this variant so both produce the
    /// same response.
    #[error("404 page not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request entity too large")]
    PayloadTooLarge,

    #[error("method not allowed")]
    MethodNotAllowed { allow: &'static str },

    #[error("invalid range")]
    RangeNotSatisfiable { size: u64 },

    #[error("precondition failed")]
    PreconditionFailed,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] stash_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] stash_metadata::MetadataError),

    #[error("invalid input: {0}")]
    Core(#[from] stash_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    ///
    /// Used as the `type` label of the upload error counter.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::PayloadTooLarge => "payload_too_large",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Self::PreconditionFailed => "precondition_failed",
            Self::Internal(_) => "internal_error",
            Self::Io(_) => "io_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Core(_) => "invalid_input",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) | Self::Io(_) | Self::Storage(_) | Self::Metadata(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Map a multipart read failure, keeping axum's 413 for an exceeded
    /// body limit.
    pub fn from_multipart(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge
        } else {
            Self::BadRequest(err.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
            "500 internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut response = (status, format!("{message}\n")).into_response();
        let headers = response.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        match self {
            Self::MethodNotAllowed { allow } => {
                headers.insert(ALLOW, HeaderValue::from_static(allow));
            }
            Self::RangeNotSatisfiable { size } => {
                if let Ok(value) = HeaderValue::try_from(format!("bytes */{size}")) {
                    headers.insert(axum::http::header::CONTENT_RANGE, value);
                }
            }
            _ => {}
        }
        response
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
