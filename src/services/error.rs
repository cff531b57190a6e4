//! Error taxonomy shared by the storage services.

use crate::services::metadata::MetadataError;
use std::io;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("path `{0}` escapes the storage root")]
    PathEscape(String),
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("`{0}` is a directory")]
    IsDirectory(String),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("declared size {declared} does not match reported total {reported}")]
    SizeMismatch { declared: u64, reported: u64 },
    #[error("invalid size {0}")]
    InvalidSize(u64),
    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("invalid checksum `{0}`")]
    InvalidChecksum(String),
    #[error("unsupported checksum algorithm `{0}`")]
    UnsupportedAlgorithm(String),
    #[error("session `{0}` not found")]
    SessionNotFound(Uuid),
    #[error("session `{0}` expired")]
    SessionExpired(Uuid),
    #[error("invalid content range: {0}")]
    InvalidContentRange(String),
    #[error("range {start}-{end} out of bounds for size {size}")]
    RangeOutOfBounds { start: u64, end: u64, size: u64 },
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        StoreError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Map an I/O error on `path`, keeping `NotFound` distinguishable.
    pub(crate) fn from_io(path: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound(path.to_string())
        } else {
            StoreError::Io(err)
        }
    }
}
