//! Resumable downloads.
//!
//! A session pins an object's location, size and checksum; the client then
//! pulls byte ranges until the last byte has been served, at which point the
//! session is retired.

use crate::{
    models::{
        object::ObjectRecord,
        session::{DownloadSession, Expiring},
    },
    services::{
        content_store::{ChecksumAlgorithm, ContentStore},
        error::{StoreError, StoreResult},
        metadata::{MetadataError, MetadataStore, with_timeout},
        reconciler::Reconciler,
        session_store::{InMemorySessionStore, SessionStore},
        storage_service::TransferLimits,
    },
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// What the client asked to download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadTarget {
    Id(Uuid),
    /// Display path from the owner's root, e.g. `Documents/report.pdf`.
    Path(String),
}

/// A served byte range.
#[derive(Clone, Debug)]
pub struct FetchedChunk {
    pub data: Bytes,
    pub start: u64,
    pub end: u64,
    pub size: u64,
    /// True when this range reached the last byte; the session is gone.
    pub complete: bool,
}

/// Where a download's bytes come from.
#[derive(Clone, Debug)]
struct Located {
    file_id: Uuid,
    display_name: String,
    sandbox_path: String,
    sha256: Option<String>,
    mime_type: Option<String>,
}

#[derive(Clone)]
pub struct DownloadSessionManager {
    content: ContentStore,
    reconciler: Reconciler,
    metadata: Arc<dyn MetadataStore>,
    sessions: Arc<dyn SessionStore<DownloadSession>>,
    limits: TransferLimits,
}

impl DownloadSessionManager {
    pub fn new(
        content: ContentStore,
        metadata: Arc<dyn MetadataStore>,
        limits: TransferLimits,
    ) -> Self {
        Self::with_store(
            content,
            metadata,
            Arc::new(InMemorySessionStore::new()),
            limits,
        )
    }

    pub fn with_store(
        content: ContentStore,
        metadata: Arc<dyn MetadataStore>,
        sessions: Arc<dyn SessionStore<DownloadSession>>,
        limits: TransferLimits,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(content.clone()),
            content,
            metadata,
            sessions,
            limits,
        }
    }

    pub async fn init_download(
        &self,
        owner_id: Uuid,
        target: DownloadTarget,
    ) -> StoreResult<DownloadSession> {
        let located = match target {
            DownloadTarget::Id(id) => self.locate_by_id(owner_id, id).await?,
            DownloadTarget::Path(path) => self.locate_by_path(owner_id, &path).await?,
        };

        let size = self.content.size(&located.sandbox_path).await?;
        let sha256 = match located.sha256 {
            Some(sum) => sum,
            None => {
                self.content
                    .checksum(&located.sandbox_path, ChecksumAlgorithm::Sha256)
                    .await?
            }
        };

        let now = Utc::now();
        let session = DownloadSession {
            session_id: Uuid::new_v4(),
            file_id: located.file_id,
            owner_id,
            display_name: located.display_name,
            sandbox_path: located.sandbox_path,
            size,
            sha256,
            mime_type: located
                .mime_type
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            created_at: now,
            expires_at: now + self.limits.session_ttl,
        };
        self.sessions.put(session.session_id, session.clone());
        info!(
            "download session {} opened for object {} ({} bytes)",
            session.session_id, session.file_id, session.size
        );
        Ok(session)
    }

    /// Serve `[start, end]` (inclusive) of the session's object.
    ///
    /// Missing, foreign and expired sessions all read as `SessionNotFound`.
    pub async fn fetch_chunk(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
        start: u64,
        end: u64,
    ) -> StoreResult<FetchedChunk> {
        let session = self.live_session(owner_id, session_id)?;

        let out_of_bounds = StoreError::RangeOutOfBounds {
            start,
            end,
            size: session.size,
        };
        if start > end || end >= session.size {
            return Err(out_of_bounds);
        }
        let len = end - start + 1;
        if len > self.limits.max_chunk_bytes {
            return Err(out_of_bounds);
        }

        let data = self
            .content
            .read_range(&session.sandbox_path, start, len)
            .await?;
        let complete = end + 1 >= session.size;
        if complete {
            self.sessions.delete(&session_id);
            info!("download session {} served its last byte", session_id);
        }
        Ok(FetchedChunk {
            data,
            start,
            end,
            size: session.size,
            complete,
        })
    }

    /// Serve a 0-byte object: there is no byte range to ask for, so the
    /// single call yields an empty body and retires the session.
    pub fn fetch_empty(&self, owner_id: Uuid, session_id: Uuid) -> StoreResult<FetchedChunk> {
        let session = self.live_session(owner_id, session_id)?;
        if session.size != 0 {
            return Err(StoreError::RangeOutOfBounds {
                start: 0,
                end: 0,
                size: session.size,
            });
        }
        self.sessions.delete(&session_id);
        info!("download session {} served an empty object", session_id);
        Ok(FetchedChunk {
            data: Bytes::new(),
            start: 0,
            end: 0,
            size: 0,
            complete: true,
        })
    }

    pub fn session(&self, owner_id: Uuid, session_id: Uuid) -> StoreResult<DownloadSession> {
        self.sessions
            .get(&session_id)
            .filter(|session| session.owner_id == owner_id && !session.is_expired(Utc::now()))
            .ok_or(StoreError::SessionNotFound(session_id))
    }

    /// Forget a session. Unknown ids are a no-op.
    pub fn abort(&self, owner_id: Uuid, session_id: Uuid) {
        if let Some(session) = self.sessions.get(&session_id) {
            if session.owner_id == owner_id {
                self.sessions.delete(&session_id);
            }
        }
    }

    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.sessions.sweep(now).len()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Missing, foreign and expired sessions all read as `SessionNotFound`;
    /// an expired one is dropped on the way.
    fn live_session(&self, owner_id: Uuid, session_id: Uuid) -> StoreResult<DownloadSession> {
        let session = self
            .sessions
            .get(&session_id)
            .filter(|session| session.owner_id == owner_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        if session.is_expired(Utc::now()) {
            self.sessions.delete(&session_id);
            debug!("download session {} expired", session_id);
            return Err(StoreError::SessionNotFound(session_id));
        }
        Ok(session)
    }

    /// Metadata store first, then the filesystem walk.
    ///
    /// The walk also runs when the record points at a file that is no longer
    /// where the record says.
    async fn locate_by_id(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Located> {
        match with_timeout(
            self.limits.metadata_timeout,
            self.metadata.get_object_by_id(owner_id, id),
        )
        .await
        {
            Ok(record) => {
                if let Some(located) = self.located_from_record(&record).await? {
                    return Ok(located);
                }
                debug!("record {} has no payload on disk, walking the tree", id);
            }
            Err(MetadataError::NotFound) => {
                debug!("object {} unknown to metadata store, walking the tree", id);
            }
            Err(err) => return Err(StoreError::Metadata(err)),
        }

        let recovered = self.reconciler.recover(owner_id, id).await?;
        let record = recovered.to_record(owner_id);
        if let Err(err) = with_timeout(
            self.limits.metadata_timeout,
            self.metadata.record_recovered(&record),
        )
        .await
        {
            warn!("failed to backfill recovered object {}: {}", id, err);
        }
        Ok(Located {
            file_id: id,
            display_name: recovered.identity.display_name,
            sandbox_path: recovered.object.path,
            sha256: Some(recovered.object.sha256),
            mime_type: None,
        })
    }

    async fn locate_by_path(&self, owner_id: Uuid, path: &str) -> StoreResult<Located> {
        let record = match with_timeout(
            self.limits.metadata_timeout,
            self.metadata.get_object_by_path(owner_id, path),
        )
        .await
        {
            Ok(record) => record,
            Err(MetadataError::NotFound) => return Err(StoreError::NotFound(path.to_string())),
            Err(err) => return Err(StoreError::Metadata(err)),
        };
        if record.is_folder {
            return Err(StoreError::IsDirectory(path.to_string()));
        }
        match self.located_from_record(&record).await? {
            Some(located) => Ok(located),
            // The id is known now, so the walk can still find it.
            None => self.locate_by_id(owner_id, record.id).await,
        }
    }

    /// `None` when the record has no usable payload path.
    async fn located_from_record(&self, record: &ObjectRecord) -> StoreResult<Option<Located>> {
        if record.is_folder {
            return Err(StoreError::IsDirectory(record.name.clone()));
        }
        let Some(path) = record.storage_path.clone() else {
            return Ok(None);
        };
        if !self.content.exists(&path).await? {
            return Ok(None);
        }
        Ok(Some(Located {
            file_id: record.id,
            display_name: record.name.clone(),
            sandbox_path: path,
            sha256: record.checksum.clone(),
            mime_type: record.mime_type.clone(),
        }))
    }
}
