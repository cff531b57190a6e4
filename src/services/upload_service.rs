//! Resumable uploads.
//!
//! A session is opened with the final display path and size, then filled by
//! chunks addressed with `Content-Range`. Chunks are written positionally
//! into `temp/{session_id}` and may arrive in any order or be retried. Once
//! the received ranges cover the whole object the staging file is verified,
//! moved to `{owner}/{folders}/{id}_{name}` and recorded in the metadata
//! store.
//!
//! Writes to one session are serialized by that session's own lock; other
//! sessions proceed in parallel.

use crate::{
    models::{
        object::ObjectRecord,
        session::{Expiring, UploadSession},
    },
    services::{
        content_store::{ChecksumAlgorithm, ContentStore},
        error::{StoreError, StoreResult},
        folders::{FolderPathResolver, split_display_path},
        metadata::{MetadataStore, with_timeout},
        naming,
        ranges::{ContentRange, CoveredRanges},
        session_store::{InMemorySessionStore, SessionStore},
        storage_service::TransferLimits,
    },
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, stream};
use serde::Serialize;
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Directory holding staging files, relative to the storage root.
pub const STAGING_DIR: &str = "temp";

/// Parameters for opening an upload session.
#[derive(Clone, Debug)]
pub struct InitUpload {
    pub owner_id: Uuid,
    /// Display path of the finished file, e.g. `Documents/report.pdf`.
    pub path: String,
    pub declared_size: u64,
    /// Lowercase or uppercase hex SHA-256.
    pub expected_checksum: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug)]
struct UploadProgress {
    ranges: CoveredRanges,
    /// Set once the session has been finalized or discarded.
    closed: bool,
}

/// A session plus its mutable progress, shared by concurrent chunk writers.
#[derive(Debug)]
pub struct UploadEntry {
    pub session: UploadSession,
    progress: Mutex<UploadProgress>,
}

impl Expiring for UploadEntry {
    fn expires_at(&self) -> DateTime<Utc> {
        self.session.expires_at
    }
}

/// Outcome of a chunk write.
#[derive(Clone, Debug)]
pub enum ChunkOutcome {
    /// More bytes are needed; `received` counts distinct bytes so far.
    Partial { received: u64 },
    /// The object was verified and recorded.
    Complete(ObjectRecord),
}

/// Progress report for clients resuming an interrupted upload.
#[derive(Clone, Debug, Serialize)]
pub struct UploadStatus {
    pub session_id: Uuid,
    pub declared_size: u64,
    pub received_bytes: u64,
    /// Inclusive byte ranges already stored.
    pub received: Vec<(u64, u64)>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UploadSessionManager {
    content: ContentStore,
    folders: FolderPathResolver,
    metadata: Arc<dyn MetadataStore>,
    sessions: Arc<dyn SessionStore<Arc<UploadEntry>>>,
    limits: TransferLimits,
    completed: Arc<AtomicU64>,
}

impl UploadSessionManager {
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
        sessions: Arc<dyn SessionStore<Arc<UploadEntry>>>,
        limits: TransferLimits,
    ) -> Self {
        Self {
            folders: FolderPathResolver::new(metadata.clone(), limits.metadata_timeout),
            content,
            metadata,
            sessions,
            limits,
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open a session for `req.path`.
    ///
    /// The folder chain is created in the metadata store and the target
    /// directory on disk before the session is handed out.
    pub async fn init_upload(&self, req: InitUpload) -> StoreResult<UploadSession> {
        if req.declared_size == 0 || req.declared_size > self.limits.max_upload_bytes {
            return Err(StoreError::InvalidSize(req.declared_size));
        }
        let expected_checksum = req
            .expected_checksum
            .as_deref()
            .map(normalize_checksum)
            .transpose()?;

        if req.path.ends_with('/') {
            return Err(StoreError::invalid_path(&req.path, "missing file name"));
        }
        let segments = split_display_path(&req.path)?;
        let Some((display_name, folders)) = segments.split_last() else {
            return Err(StoreError::invalid_path(&req.path, "missing file name"));
        };
        naming::validate_display_name(display_name)
            .map_err(|err| StoreError::invalid_path(&req.path, err.to_string()))?;

        let folder_path = folders.join("/");
        let parent_folder_id = self.folders.ensure(req.owner_id, &folder_path).await?;

        let target_dir = if folder_path.is_empty() {
            req.owner_id.to_string()
        } else {
            format!("{}/{}", req.owner_id, folder_path)
        };
        self.content.create_dir(&target_dir).await?;

        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let session = UploadSession {
            session_id,
            owner_id: req.owner_id,
            target_dir,
            display_name: display_name.to_string(),
            declared_size: req.declared_size,
            expected_checksum,
            parent_folder_id,
            mime_type: req.mime_type,
            staging_path: format!("{STAGING_DIR}/{session_id}"),
            created_at: now,
            expires_at: now + self.limits.session_ttl,
        };
        self.sessions.put(
            session_id,
            Arc::new(UploadEntry {
                session: session.clone(),
                progress: Mutex::new(UploadProgress {
                    ranges: CoveredRanges::new(),
                    closed: false,
                }),
            }),
        );

        info!(
            "upload session {} opened for owner {} -> {}/{} ({} bytes)",
            session_id, session.owner_id, session.target_dir, session.display_name, session.declared_size
        );
        Ok(session)
    }

    /// Write one chunk held in memory.
    pub async fn write_chunk(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
        range: ContentRange,
        data: Bytes,
    ) -> StoreResult<ChunkOutcome> {
        let body = stream::once(async move { Ok::<_, io::Error>(data) });
        self.write_chunk_stream(owner_id, session_id, range, body).await
    }

    /// Write one chunk streamed from the request body.
    ///
    /// A `total` differing from the declared size is terminal for the
    /// session. The body must carry exactly `range.len()` bytes.
    pub async fn write_chunk_stream<S>(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
        range: ContentRange,
        body: S,
    ) -> StoreResult<ChunkOutcome>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let entry = self.live_entry(owner_id, session_id).await?;
        let session = &entry.session;

        if range.total != session.declared_size {
            self.discard(&entry).await;
            return Err(StoreError::SizeMismatch {
                declared: session.declared_size,
                reported: range.total,
            });
        }
        if range.start > range.end || range.end >= range.total {
            return Err(StoreError::InvalidContentRange(format!(
                "bytes {}-{}/{}",
                range.start, range.end, range.total
            )));
        }
        if range.len() > self.limits.max_chunk_bytes {
            return Err(StoreError::InvalidContentRange(format!(
                "chunk of {} bytes exceeds limit of {}",
                range.len(),
                self.limits.max_chunk_bytes
            )));
        }

        let mut progress = entry.progress.lock().await;
        if progress.closed {
            return Err(StoreError::SessionNotFound(session_id));
        }

        // Never let a body longer than its range spill past `end`.
        let limit = range.len();
        let mut seen: u64 = 0;
        let bounded = body.map(move |chunk| {
            let chunk = chunk?;
            seen += chunk.len() as u64;
            if seen > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "chunk body longer than its content range",
                ));
            }
            Ok(chunk)
        });
        let written = match self
            .content
            .write_at(&session.staging_path, range.start, bounded)
            .await
        {
            Ok(written) => written,
            Err(StoreError::Io(err)) if err.kind() == io::ErrorKind::InvalidData => {
                return Err(StoreError::InvalidContentRange(err.to_string()));
            }
            Err(err) => return Err(err),
        };
        if written != limit {
            return Err(StoreError::InvalidContentRange(format!(
                "expected {} bytes for range {}-{}, received {}",
                limit, range.start, range.end, written
            )));
        }

        progress.ranges.insert(range.start, range.end + 1);
        debug!(
            "session {}: stored bytes {}-{}/{}",
            session_id, range.start, range.end, range.total
        );
        if !progress.ranges.covers(session.declared_size) {
            return Ok(ChunkOutcome::Partial {
                received: progress.ranges.received_bytes(),
            });
        }

        progress.closed = true;
        let result = self.finalize(session).await;
        self.sessions.delete(&session_id);
        if result.is_err() {
            self.remove_staging(session).await;
        }
        result.map(ChunkOutcome::Complete)
    }

    /// Verify, move into place, and record the finished object.
    async fn finalize(&self, session: &UploadSession) -> StoreResult<ObjectRecord> {
        let actual = self
            .content
            .checksum(&session.staging_path, ChecksumAlgorithm::Sha256)
            .await?;
        if let Some(expected) = &session.expected_checksum {
            if *expected != actual {
                warn!(
                    "session {}: checksum mismatch (expected {}, got {})",
                    session.session_id, expected, actual
                );
                return Err(StoreError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let object_id = Uuid::new_v4();
        let file_name = naming::encode(object_id, &session.display_name)
            .map_err(|err| StoreError::invalid_path(&session.display_name, err.to_string()))?;
        let final_path = format!("{}/{}", session.target_dir, file_name);
        self.content
            .move_to(&session.staging_path, &final_path)
            .await?;

        let now = Utc::now();
        let record = ObjectRecord {
            id: object_id,
            owner_id: session.owner_id,
            parent_id: session.parent_folder_id,
            name: session.display_name.clone(),
            is_folder: false,
            size_bytes: i64::try_from(session.declared_size)
                .map_err(|_| StoreError::InvalidSize(session.declared_size))?,
            checksum: Some(actual),
            mime_type: session.mime_type.clone(),
            storage_path: Some(final_path.clone()),
            revision: 1,
            created_at: now,
            updated_at: now,
        };

        match with_timeout(self.limits.metadata_timeout, self.metadata.create_object(&record)).await
        {
            Ok(created) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    "upload session {} completed as object {} at {}",
                    session.session_id, created.id, final_path
                );
                Ok(created)
            }
            Err(err) => {
                // Without a record the file would be reachable only by reconciliation.
                if let Err(cleanup) = self.content.delete(&final_path).await {
                    warn!("failed to remove unrecorded file {}: {}", final_path, cleanup);
                }
                Err(StoreError::Metadata(err))
            }
        }
    }

    /// Received ranges of an open session.
    pub async fn status(&self, owner_id: Uuid, session_id: Uuid) -> StoreResult<UploadStatus> {
        let entry = self.live_entry(owner_id, session_id).await?;
        let progress = entry.progress.lock().await;
        Ok(UploadStatus {
            session_id,
            declared_size: entry.session.declared_size,
            received_bytes: progress.ranges.received_bytes(),
            received: progress.ranges.inclusive(),
            expires_at: entry.session.expires_at,
        })
    }

    /// Discard a session and its staging file. Unknown ids are a no-op, so
    /// calling this twice is safe.
    pub async fn abort(&self, owner_id: Uuid, session_id: Uuid) -> StoreResult<()> {
        match self.sessions.get(&session_id) {
            Some(entry) if entry.session.owner_id == owner_id => {
                self.discard(&entry).await;
                info!("upload session {} aborted", session_id);
            }
            Some(_) => {}
            None => debug!("abort of unknown upload session {}", session_id),
        }
        Ok(())
    }

    /// Drop expired sessions and their staging files.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let expired = self.sessions.sweep(now);
        for entry in &expired {
            entry.progress.lock().await.closed = true;
            self.remove_staging(&entry.session).await;
        }
        expired.len()
    }

    pub fn is_active(&self, session_id: &Uuid) -> bool {
        self.sessions.contains(session_id)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn completed_uploads(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Fetch a session owned by `owner_id`, purging it if it has expired.
    async fn live_entry(&self, owner_id: Uuid, session_id: Uuid) -> StoreResult<Arc<UploadEntry>> {
        let entry = self
            .sessions
            .get(&session_id)
            .filter(|entry| entry.session.owner_id == owner_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        if entry.is_expired(Utc::now()) {
            self.discard(&entry).await;
            return Err(StoreError::SessionExpired(session_id));
        }
        Ok(entry)
    }

    async fn discard(&self, entry: &UploadEntry) {
        self.sessions.delete(&entry.session.session_id);
        entry.progress.lock().await.closed = true;
        self.remove_staging(&entry.session).await;
    }

    async fn remove_staging(&self, session: &UploadSession) {
        match self.content.delete(&session.staging_path).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(err) => warn!(
                "failed to remove staging file {}: {}",
                session.staging_path, err
            ),
        }
    }
}

fn normalize_checksum(value: &str) -> StoreResult<String> {
    let value = value.trim().to_ascii_lowercase();
    if value.len() != 64 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(StoreError::InvalidChecksum(value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{metadata::SqliteMetadataStore, sandbox::PathSandbox};
    use sha2::{Digest, Sha256};
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        content: ContentStore,
        metadata: Arc<SqliteMetadataStore>,
        uploads: UploadSessionManager,
    }

    async fn fixture_with(limits: TransferLimits) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::new(PathSandbox::new(dir.path()).unwrap());
        let metadata = Arc::new(SqliteMetadataStore::in_memory().await.unwrap());
        let uploads = UploadSessionManager::new(content.clone(), metadata.clone(), limits);
        Fixture {
            _dir: dir,
            content,
            metadata,
            uploads,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(TransferLimits::default()).await
    }

    fn init(owner_id: Uuid, path: &str, data: &[u8], checksum: Option<String>) -> InitUpload {
        InitUpload {
            owner_id,
            path: path.to_string(),
            declared_size: data.len() as u64,
            expected_checksum: checksum,
            mime_type: Some("text/plain".into()),
        }
    }

    fn range(start: u64, end: u64, total: u64) -> ContentRange {
        ContentRange { start, end, total }
    }

    fn sha256_hex(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    async fn write(
        fx: &Fixture,
        owner: Uuid,
        session: &UploadSession,
        data: &[u8],
        start: usize,
        end: usize,
    ) -> StoreResult<ChunkOutcome> {
        fx.uploads
            .write_chunk(
                owner,
                session.session_id,
                range(start as u64, end as u64 - 1, data.len() as u64),
                Bytes::copy_from_slice(&data[start..end]),
            )
            .await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_complete_exactly_once() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data: Vec<u8> = (0..32 * 1024).map(|i| (i % 251) as u8).collect();
        let session = fx
            .uploads
            .init_upload(init(owner, "Shared/blob.bin", &data, Some(sha256_hex(&data))))
            .await
            .unwrap();

        // Every chunk is sent twice, so some writers queue behind the
        // finalizing one.
        let chunk = 4 * 1024;
        let mut tasks = Vec::new();
        for _ in 0..2 {
            for start in (0..data.len()).step_by(chunk) {
                let uploads = fx.uploads.clone();
                let body = Bytes::copy_from_slice(&data[start..start + chunk]);
                let content_range =
                    range(start as u64, (start + chunk) as u64 - 1, data.len() as u64);
                let session_id = session.session_id;
                tasks.push(tokio::spawn(async move {
                    uploads.write_chunk(owner, session_id, content_range, body).await
                }));
            }
        }

        let mut completed = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(ChunkOutcome::Complete(record)) => completed.push(record),
                Ok(ChunkOutcome::Partial { .. }) | Err(StoreError::SessionNotFound(_)) => {}
                Err(other) => panic!("unexpected chunk result: {other}"),
            }
        }
        assert_eq!(completed.len(), 1);
        let record = &completed[0];
        let path = record.storage_path.clone().unwrap();
        assert_eq!(fx.content.read(&path).await.unwrap(), &data[..]);
        assert_eq!(fx.uploads.completed_uploads(), 1);
        assert!(!fx.uploads.is_active(&session.session_id));
        assert!(!fx.content.exists(&session.staging_path).await.unwrap());
    }

    #[tokio::test]
    async fn writes_after_completion_find_no_session() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"abcdef";
        let session = fx
            .uploads
            .init_upload(init(owner, "late.txt", data, None))
            .await
            .unwrap();

        assert!(matches!(
            write(&fx, owner, &session, data, 0, 6).await,
            Ok(ChunkOutcome::Complete(_))
        ));
        assert!(matches!(
            write(&fx, owner, &session, data, 0, 3).await,
            Err(StoreError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn single_chunk_upload_lands_under_encoded_name() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"hello resumable world";
        let session = fx
            .uploads
            .init_upload(init(owner, "Documents/hello.txt", data, Some(sha256_hex(data))))
            .await
            .unwrap();

        let outcome = write(&fx, owner, &session, data, 0, data.len()).await.unwrap();
        let ChunkOutcome::Complete(record) = outcome else {
            panic!("expected completion");
        };

        let path = record.storage_path.clone().unwrap();
        assert_eq!(path, format!("{owner}/Documents/{}_hello.txt", record.id));
        assert_eq!(fx.content.read(&path).await.unwrap(), &data[..]);
        assert_eq!(record.checksum.as_deref(), Some(sha256_hex(data).as_str()));
        assert!(record.parent_id.is_some());
        assert!(!fx.content.exists(&session.staging_path).await.unwrap());
        assert!(!fx.uploads.is_active(&session.session_id));

        let stored = fx.metadata.get_object_by_id(owner, record.id).await.unwrap();
        assert_eq!(stored, record);
        assert_eq!(fx.uploads.completed_uploads(), 1);
    }

    #[tokio::test]
    async fn chunk_order_does_not_change_result() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        for k in [1usize, 17, 500, 999] {
            let mut contents = Vec::new();
            for reverse in [false, true] {
                let fx = fixture().await;
                let owner = Uuid::new_v4();
                let session = fx
                    .uploads
                    .init_upload(init(owner, "blob.bin", &data, None))
                    .await
                    .unwrap();

                let (first, second) = if reverse {
                    ((k, data.len()), (0, k))
                } else {
                    ((0, k), (k, data.len()))
                };
                let partial = write(&fx, owner, &session, &data, first.0, first.1)
                    .await
                    .unwrap();
                assert!(matches!(partial, ChunkOutcome::Partial { .. }));

                let ChunkOutcome::Complete(record) =
                    write(&fx, owner, &session, &data, second.0, second.1)
                        .await
                        .unwrap()
                else {
                    panic!("expected completion for k={k}");
                };
                let path = record.storage_path.unwrap();
                contents.push(fx.content.read(&path).await.unwrap());
            }
            assert_eq!(contents[0], contents[1]);
            assert_eq!(contents[0], &data[..]);
        }
    }

    #[tokio::test]
    async fn final_chunk_first_waits_for_the_gap() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"0123456789";
        let session = fx
            .uploads
            .init_upload(init(owner, "digits.txt", data, None))
            .await
            .unwrap();

        let outcome = write(&fx, owner, &session, data, 5, 10).await.unwrap();
        assert!(matches!(outcome, ChunkOutcome::Partial { received: 5 }));

        let status = fx.uploads.status(owner, session.session_id).await.unwrap();
        assert_eq!(status.received, vec![(5, 9)]);

        // identical retry stays partial
        let outcome = write(&fx, owner, &session, data, 5, 10).await.unwrap();
        assert!(matches!(outcome, ChunkOutcome::Partial { received: 5 }));

        let outcome = write(&fx, owner, &session, data, 0, 5).await.unwrap();
        assert!(matches!(outcome, ChunkOutcome::Complete(_)));
    }

    #[tokio::test]
    async fn checksum_mismatch_creates_nothing() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"payload";
        let session = fx
            .uploads
            .init_upload(init(owner, "Docs/p.txt", data, Some(sha256_hex(b"other"))))
            .await
            .unwrap();

        let err = write(&fx, owner, &session, data, 0, data.len()).await.unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
        assert!(!fx.content.exists(&session.staging_path).await.unwrap());
        assert!(!fx.uploads.is_active(&session.session_id));

        let parent = session.parent_folder_id;
        let children = fx.metadata.list_children(owner, parent).await.unwrap();
        assert!(children.is_empty());
        assert!(fx.content.list(&session.target_dir).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn size_mismatch_is_terminal() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"0123456789";
        let session = fx
            .uploads
            .init_upload(init(owner, "digits.txt", data, None))
            .await
            .unwrap();
        write(&fx, owner, &session, data, 0, 4).await.unwrap();

        let err = fx
            .uploads
            .write_chunk(owner, session.session_id, range(4, 9, 11), Bytes::from_static(b"456789"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SizeMismatch { declared: 10, reported: 11 }));
        assert!(!fx.content.exists(&session.staging_path).await.unwrap());

        let err = write(&fx, owner, &session, data, 4, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn body_length_must_match_range() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"0123456789";
        let session = fx
            .uploads
            .init_upload(init(owner, "digits.txt", data, None))
            .await
            .unwrap();

        let short = fx
            .uploads
            .write_chunk(owner, session.session_id, range(0, 4, 10), Bytes::from_static(b"012"))
            .await;
        assert!(matches!(short, Err(StoreError::InvalidContentRange(_))));
        let long = fx
            .uploads
            .write_chunk(owner, session.session_id, range(0, 1, 10), Bytes::from_static(b"0123"))
            .await;
        assert!(matches!(long, Err(StoreError::InvalidContentRange(_))));

        // neither counted as received
        let status = fx.uploads.status(owner, session.session_id).await.unwrap();
        assert_eq!(status.received_bytes, 0);
    }

    #[tokio::test]
    async fn init_rejects_bad_paths_and_sizes() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        for path in ["/etc/passwd", "../x.txt", "a/../../x.txt", "", "dir/"] {
            let err = fx.uploads.init_upload(init(owner, path, b"abc", None)).await;
            assert!(matches!(err, Err(StoreError::InvalidPath { .. })), "{path}");
        }

        let err = fx.uploads.init_upload(init(owner, "empty.txt", b"", None)).await;
        assert!(matches!(err, Err(StoreError::InvalidSize(0))));

        let err = fx
            .uploads
            .init_upload(init(owner, "x.txt", b"abc", Some("xyz".into())))
            .await;
        assert!(matches!(err, Err(StoreError::InvalidChecksum(_))));
    }

    #[tokio::test]
    async fn abort_is_idempotent_and_owner_scoped() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"0123456789";
        let session = fx
            .uploads
            .init_upload(init(owner, "digits.txt", data, None))
            .await
            .unwrap();
        write(&fx, owner, &session, data, 0, 3).await.unwrap();

        // someone else's abort is ignored
        fx.uploads.abort(Uuid::new_v4(), session.session_id).await.unwrap();
        assert!(fx.uploads.is_active(&session.session_id));
        assert!(matches!(
            write(&fx, Uuid::new_v4(), &session, data, 3, 6).await,
            Err(StoreError::SessionNotFound(_))
        ));

        fx.uploads.abort(owner, session.session_id).await.unwrap();
        fx.uploads.abort(owner, session.session_id).await.unwrap();
        fx.uploads.abort(owner, Uuid::new_v4()).await.unwrap();
        assert!(!fx.content.exists(&session.staging_path).await.unwrap());
        assert!(matches!(
            fx.uploads.status(owner, session.session_id).await,
            Err(StoreError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected_and_swept() {
        let fx = fixture_with(TransferLimits {
            session_ttl: chrono::Duration::zero(),
            ..TransferLimits::default()
        })
        .await;
        let owner = Uuid::new_v4();
        let data = b"0123456789";

        let session = fx
            .uploads
            .init_upload(init(owner, "a.txt", data, None))
            .await
            .unwrap();
        let err = write(&fx, owner, &session, data, 0, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::SessionExpired(_)));

        let other = fx
            .uploads
            .init_upload(init(owner, "b.txt", data, None))
            .await
            .unwrap();
        assert_eq!(fx.uploads.sweep(Utc::now()).await, 1);
        assert!(!fx.uploads.is_active(&other.session_id));
    }

    #[tokio::test]
    async fn chunk_larger_than_limit_is_rejected() {
        let fx = fixture_with(TransferLimits {
            max_chunk_bytes: 4,
            metadata_timeout: Duration::from_secs(5),
            ..TransferLimits::default()
        })
        .await;
        let owner = Uuid::new_v4();
        let data = b"0123456789";
        let session = fx
            .uploads
            .init_upload(init(owner, "a.txt", data, None))
            .await
            .unwrap();
        assert!(matches!(
            write(&fx, owner, &session, data, 0, 5).await,
            Err(StoreError::InvalidContentRange(_))
        ));
        assert!(write(&fx, owner, &session, data, 0, 4).await.is_ok());
    }
}
