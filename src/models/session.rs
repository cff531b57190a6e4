//! Represents resumable upload and download sessions.
//!
//! Sessions live only in process memory. A restart loses them; staging
//! files left behind are removed by the periodic sweep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Anything held in a session store that can go stale.
pub trait Expiring {
    fn expires_at(&self) -> DateTime<Utc>;

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }
}

impl<T: Expiring> Expiring for std::sync::Arc<T> {
    fn expires_at(&self) -> DateTime<Utc> {
        (**self).expires_at()
    }
}

/// An in-progress chunked upload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadSession {
    pub session_id: Uuid,

    pub owner_id: Uuid,

    /// Sandbox-relative directory the finished file is moved into.
    /// Validated and created when the session starts.
    pub target_dir: String,

    /// Base name of the finished file, before identity encoding.
    pub display_name: String,

    /// Total size the client promised to send.
    pub declared_size: u64,

    /// Lowercase hex SHA-256 the finished payload must match.
    pub expected_checksum: Option<String>,

    /// Folder the finished object is recorded under.
    pub parent_folder_id: Option<Uuid>,

    pub mime_type: Option<String>,

    /// Sandbox-relative staging file, `temp/{session_id}`.
    pub staging_path: String,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Expiring for UploadSession {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// A resumable download of an already stored object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DownloadSession {
    pub session_id: Uuid,
    pub file_id: Uuid,
    pub owner_id: Uuid,
    pub display_name: String,

    /// Sandbox-relative path of the payload.
    pub sandbox_path: String,

    pub size: u64,
    pub sha256: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Expiring for DownloadSession {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
