//! Represents objects (files and folders) as seen by the metadata store and
//! by the filesystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A file or folder record owned by the metadata store.
///
/// The record describes identity and hierarchy only; payload bytes live on
/// disk under `storage_path` (sandbox-relative) and are never loaded here.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct ObjectRecord {
    /// Opaque unique identifier, also the prefix of the on-disk file name.
    pub id: Uuid,

    /// User that owns this object.
    pub owner_id: Uuid,

    /// Containing folder, `None` for the owner's root.
    pub parent_id: Option<Uuid>,

    /// Display name (never contains a path separator).
    pub name: String,

    /// Whether this record is a folder.
    pub is_folder: bool,

    /// Size in bytes (0 for folders).
    pub size_bytes: i64,

    /// Lowercase hex SHA-256 of the payload, when known.
    pub checksum: Option<String>,

    /// Content type as supplied by the client.
    pub mime_type: Option<String>,

    /// Sandbox-relative location of the payload, when known.
    pub storage_path: Option<String>,

    /// Monotonic revision counter, bumped by updates.
    pub revision: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ObjectRecord {
    /// Build a fresh folder record under `parent_id`.
    pub fn new_folder(owner_id: Uuid, parent_id: Option<Uuid>, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            parent_id,
            name: name.to_string(),
            is_folder: true,
            size_bytes: 0,
            checksum: None,
            mime_type: None,
            storage_path: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The pair that ties a physical file to a metadata-store identity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectIdentity {
    pub id: Uuid,
    pub display_name: String,
}

/// A physical file as reported by the filesystem.
///
/// Derived on demand, never cached.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoredObject {
    /// Sandbox-relative path.
    pub path: String,
    pub size: u64,
    pub is_directory: bool,
    pub modified_at: DateTime<Utc>,
    pub md5: String,
    pub sha256: String,
}

/// An object whose identity was regained from its file name.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RecoveredObject {
    pub identity: ObjectIdentity,
    pub object: StoredObject,
}

impl RecoveredObject {
    /// Synthesize a metadata record from filesystem facts.
    ///
    /// The parent folder cannot be inferred from disk, so the record is
    /// attached to the owner's root.
    pub fn to_record(&self, owner_id: Uuid) -> ObjectRecord {
        ObjectRecord {
            id: self.identity.id,
            owner_id,
            parent_id: None,
            name: self.identity.display_name.clone(),
            is_folder: false,
            size_bytes: i64::try_from(self.object.size).unwrap_or(i64::MAX),
            checksum: Some(self.object.sha256.clone()),
            mime_type: None,
            storage_path: Some(self.object.path.clone()),
            revision: 1,
            created_at: self.object.modified_at,
            updated_at: self.object.modified_at,
        }
    }
}
