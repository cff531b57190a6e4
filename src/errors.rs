use crate::services::{auth::AuthError, error::StoreError, metadata::MetadataError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Map an error raised while serving a download range: range problems
    /// are 416 there, 400 everywhere else.
    pub fn from_download(err: StoreError) -> Self {
        match err {
            StoreError::RangeOutOfBounds { .. } => {
                Self::new(StatusCode::RANGE_NOT_SATISFIABLE, err.to_string())
            }
            other => other.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::PathEscape(_)
            | StoreError::InvalidPath { .. }
            | StoreError::SizeMismatch { .. }
            | StoreError::InvalidSize(_)
            | StoreError::ChecksumMismatch { .. }
            | StoreError::InvalidChecksum(_)
            | StoreError::UnsupportedAlgorithm(_)
            | StoreError::InvalidContentRange(_)
            | StoreError::RangeOutOfBounds { .. }
            | StoreError::IsDirectory(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_)
            | StoreError::SessionNotFound(_)
            | StoreError::SessionExpired(_)
            | StoreError::Metadata(MetadataError::NotFound) => StatusCode::NOT_FOUND,
            StoreError::Metadata(meta) if meta.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Metadata(_) | StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            // Internal detail stays in the logs.
            tracing::error!("request failed: {}", err);
            let message = if status == StatusCode::SERVICE_UNAVAILABLE {
                "service temporarily unavailable"
            } else {
                "internal server error"
            };
            return AppError::new(status, message);
        }
        AppError::new(status, err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::new(StatusCode::UNAUTHORIZED, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use uuid::Uuid;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        let cases = [
            (StoreError::PathEscape("../x".into()), StatusCode::BAD_REQUEST),
            (
                StoreError::ChecksumMismatch {
                    expected: "a".into(),
                    actual: "b".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (StoreError::SessionNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (StoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                StoreError::Metadata(MetadataError::Transient("busy".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = AppError::from(StoreError::Io(io::Error::other("/secret/path exploded")));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("secret"));
    }

    #[test]
    fn download_ranges_are_416() {
        let err = AppError::from_download(StoreError::RangeOutOfBounds {
            start: 0,
            end: 20,
            size: 10,
        });
        assert_eq!(err.status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            AppError::from_download(StoreError::SessionNotFound(Uuid::nil())).status,
            StatusCode::NOT_FOUND
        );
    }
}
