//! src/services/storage_service.rs
//!
//! StorageService: the shared state handed to every HTTP handler. It wires
//! the sandboxed content store, the metadata store and both resumable
//! session managers together, and runs the periodic sweep that retires
//! expired sessions and orphaned staging files.

use crate::services::{
    auth::TokenValidator,
    content_store::ContentStore,
    download_service::DownloadSessionManager,
    error::{StoreError, StoreResult},
    metadata::MetadataStore,
    sandbox::PathSandbox,
    upload_service::{STAGING_DIR, UploadSessionManager},
};
use chrono::Utc;
use std::{path::Path, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bounds applied to resumable transfers.
#[derive(Clone, Debug)]
pub struct TransferLimits {
    /// Lifetime of upload and download sessions.
    pub session_ttl: chrono::Duration,
    /// Largest object an upload session accepts.
    pub max_upload_bytes: u64,
    /// Largest single chunk accepted or served.
    pub max_chunk_bytes: u64,
    /// Deadline for each metadata store call.
    pub metadata_timeout: Duration,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            session_ttl: chrono::Duration::hours(24),
            max_upload_bytes: 10 * 1024 * 1024 * 1024,
            max_chunk_bytes: 64 * 1024 * 1024,
            metadata_timeout: Duration::from_secs(5),
        }
    }
}

/// What one sweep pass removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_uploads: usize,
    pub expired_downloads: usize,
    pub orphaned_staging_files: usize,
}

#[derive(Clone)]
pub struct StorageService {
    pub metadata: Arc<dyn MetadataStore>,
    pub content: ContentStore,
    pub uploads: UploadSessionManager,
    pub downloads: DownloadSessionManager,
    pub tokens: Arc<dyn TokenValidator>,
    pub limits: TransferLimits,
}

impl StorageService {
    /// Build the service rooted at `base_path`, creating the root and the
    /// staging directory if needed.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        tokens: Arc<dyn TokenValidator>,
        base_path: impl AsRef<Path>,
        limits: TransferLimits,
    ) -> StoreResult<Self> {
        let sandbox = PathSandbox::new(base_path)?;
        std::fs::create_dir_all(sandbox.resolve(STAGING_DIR)?)?;
        let content = ContentStore::new(sandbox);

        Ok(Self {
            uploads: UploadSessionManager::new(content.clone(), metadata.clone(), limits.clone()),
            downloads: DownloadSessionManager::new(content.clone(), metadata.clone(), limits.clone()),
            metadata,
            content,
            tokens,
            limits,
        })
    }

    pub fn base_path(&self) -> &Path {
        self.content.root()
    }

    /// Retire expired sessions, then delete staging files that no live
    /// session owns and that are older than the session TTL. The second
    /// step catches files orphaned by a restart.
    pub async fn sweep(&self) -> StoreResult<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport {
            expired_uploads: self.uploads.sweep(now).await,
            expired_downloads: self.downloads.sweep(now),
            ..SweepReport::default()
        };

        let entries = match self.content.list_entries(STAGING_DIR).await {
            Ok(entries) => entries,
            Err(StoreError::NotFound(_)) => return Ok(report),
            Err(err) => return Err(err),
        };
        let cutoff = now - self.limits.session_ttl;
        for entry in entries {
            let owned = Uuid::try_parse(&entry.name)
                .map(|id| self.uploads.is_active(&id))
                .unwrap_or(false);
            if owned || entry.modified_at > cutoff {
                continue;
            }
            let path = format!("{STAGING_DIR}/{}", entry.name);
            match self.content.delete(&path).await {
                Ok(()) => report.orphaned_staging_files += 1,
                Err(StoreError::NotFound(_)) => {}
                Err(err) => warn!("failed to remove orphaned staging file {}: {}", path, err),
            }
        }

        if report != SweepReport::default() {
            info!(
                "sweep removed {} upload sessions, {} download sessions, {} orphaned staging files",
                report.expired_uploads, report.expired_downloads, report.orphaned_staging_files
            );
        } else {
            debug!("sweep found nothing to remove");
        }
        Ok(report)
    }

    /// Run [`StorageService::sweep`] every `interval` until the runtime stops.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = service.sweep().await {
                    warn!("session sweep failed: {}", err);
                }
            }
        })
    }
}
