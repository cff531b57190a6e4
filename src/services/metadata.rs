//! The metadata store: identity, hierarchy and revisions of objects.
//!
//! The storage layer only talks to it through [`MetadataStore`]. The
//! service's own implementation keeps records in SQLite.

use crate::models::object::ObjectRecord;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{future::Future, str::FromStr, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Schema applied by [`SqliteMetadataStore::migrate`].
const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

const RECORD_COLUMNS: &str = "id, owner_id, parent_id, name, is_folder, size_bytes, checksum, \
                              mime_type, storage_path, revision, created_at, updated_at";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata record not found")]
    NotFound,
    /// Worth retrying: pool exhaustion, lock contention, I/O hiccups.
    #[error("transient metadata failure: {0}")]
    Transient(String),
    #[error("metadata failure: {0}")]
    Permanent(String),
    #[error("metadata call timed out after {0:?}")]
    Timeout(Duration),
}

impl MetadataError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MetadataError::Transient(_) | MetadataError::Timeout(_))
    }
}

impl From<sqlx::Error> for MetadataError {
    fn from(err: sqlx::Error) -> Self {
        let message = err.to_string();
        match err {
            sqlx::Error::RowNotFound => MetadataError::NotFound,
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_) => MetadataError::Transient(message),
            sqlx::Error::Database(db_err) if is_busy(db_err.message()) => {
                MetadataError::Transient(message)
            }
            _ => MetadataError::Permanent(message),
        }
    }
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Remote record keeper for file identity and hierarchy.
///
/// Futures are cancelled by dropping them; callers bound every call with
/// [`with_timeout`].
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a record. Creating a folder that already exists under the same
    /// parent with the same name returns the existing folder.
    async fn create_object(&self, record: &ObjectRecord) -> MetadataResult<ObjectRecord>;

    async fn get_object_by_id(&self, owner_id: Uuid, id: Uuid) -> MetadataResult<ObjectRecord>;

    /// Look up an object by its `/`-separated display path from the owner's root.
    async fn get_object_by_path(&self, owner_id: Uuid, path: &str)
    -> MetadataResult<ObjectRecord>;

    /// Direct children of `parent_id` (`None` = owner's root).
    async fn list_children(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
    ) -> MetadataResult<Vec<ObjectRecord>>;

    /// Persist changed fields and bump the revision.
    async fn update_object(&self, record: &ObjectRecord) -> MetadataResult<ObjectRecord>;

    /// Backfill a record regained from the filesystem. Existing records win.
    async fn record_recovered(&self, record: &ObjectRecord) -> MetadataResult<()>;

    /// Cheap liveness probe.
    async fn ping(&self) -> MetadataResult<()>;
}

/// Bound a metadata call; an elapsed deadline becomes a transient error.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> MetadataResult<T>
where
    F: Future<Output = MetadataResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(MetadataError::Timeout(limit)),
    }
}

#[derive(Clone, Debug)]
pub struct SqliteMetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Open (creating if missing) the database at `url`.
    pub async fn connect(url: &str) -> MetadataResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// A private in-memory database with the schema applied.
    ///
    /// Each SQLite memory connection is its own database, so the pool is
    /// pinned to one connection that never idles out.
    pub async fn in_memory() -> MetadataResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(Arc::new(pool));
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the embedded schema. Statements are idempotent.
    pub async fn migrate(&self) -> MetadataResult<()> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());
        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    async fn find_child(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
        name: &str,
        folder_only: bool,
    ) -> MetadataResult<Option<ObjectRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM objects
             WHERE owner_id = ? AND parent_id IS ? AND name = ? AND (is_folder = 1 OR ? = 0)
             ORDER BY is_folder ASC, updated_at DESC
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, ObjectRecord>(&sql)
            .bind(owner_id)
            .bind(parent_id)
            .bind(name)
            .bind(folder_only)
            .fetch_optional(&*self.db)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn create_object(&self, record: &ObjectRecord) -> MetadataResult<ObjectRecord> {
        if record.is_folder {
            // `idx_objects_unique_folder` turns a racing duplicate into a no-op.
            let insert_sql = format!(
                "INSERT INTO objects ({RECORD_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT DO NOTHING"
            );
            sqlx::query(&insert_sql)
                .bind(record.id)
                .bind(record.owner_id)
                .bind(record.parent_id)
                .bind(&record.name)
                .bind(record.is_folder)
                .bind(record.size_bytes)
                .bind(&record.checksum)
                .bind(&record.mime_type)
                .bind(&record.storage_path)
                .bind(record.revision)
                .bind(record.created_at)
                .bind(record.updated_at)
                .execute(&*self.db)
                .await?;
            return self
                .find_child(record.owner_id, record.parent_id, &record.name, true)
                .await?
                .ok_or(MetadataError::NotFound);
        }

        let insert_sql = format!(
            "INSERT INTO objects ({RECORD_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {RECORD_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, ObjectRecord>(&insert_sql)
            .bind(record.id)
            .bind(record.owner_id)
            .bind(record.parent_id)
            .bind(&record.name)
            .bind(record.is_folder)
            .bind(record.size_bytes)
            .bind(&record.checksum)
            .bind(&record.mime_type)
            .bind(&record.storage_path)
            .bind(record.revision)
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_one(&*self.db)
            .await?;
        Ok(inserted)
    }

    async fn get_object_by_id(&self, owner_id: Uuid, id: Uuid) -> MetadataResult<ObjectRecord> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM objects WHERE id = ? AND owner_id = ?");
        let row = sqlx::query_as::<_, ObjectRecord>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_one(&*self.db)
            .await?;
        Ok(row)
    }

    async fn get_object_by_path(
        &self,
        owner_id: Uuid,
        path: &str,
    ) -> MetadataResult<ObjectRecord> {
        let segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        let Some((last, folders)) = segments.split_last() else {
            return Err(MetadataError::NotFound);
        };

        let mut parent_id = None;
        for name in folders {
            let folder = self
                .find_child(owner_id, parent_id, name, true)
                .await?
                .ok_or(MetadataError::NotFound)?;
            parent_id = Some(folder.id);
        }
        self.find_child(owner_id, parent_id, last, false)
            .await?
            .ok_or(MetadataError::NotFound)
    }

    async fn list_children(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
    ) -> MetadataResult<Vec<ObjectRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM objects
             WHERE owner_id = ? AND parent_id IS ?
             ORDER BY is_folder DESC, name ASC"
        );
        let rows = sqlx::query_as::<_, ObjectRecord>(&sql)
            .bind(owner_id)
            .bind(parent_id)
            .fetch_all(&*self.db)
            .await?;
        Ok(rows)
    }

    async fn update_object(&self, record: &ObjectRecord) -> MetadataResult<ObjectRecord> {
        let sql = format!(
            "UPDATE objects SET
                parent_id = ?, name = ?, size_bytes = ?, checksum = ?, mime_type = ?,
                storage_path = ?, revision = revision + 1, updated_at = ?
             WHERE id = ? AND owner_id = ?
             RETURNING {RECORD_COLUMNS}"
        );
        sqlx::query_as::<_, ObjectRecord>(&sql)
            .bind(record.parent_id)
            .bind(&record.name)
            .bind(record.size_bytes)
            .bind(&record.checksum)
            .bind(&record.mime_type)
            .bind(&record.storage_path)
            .bind(Utc::now())
            .bind(record.id)
            .bind(record.owner_id)
            .fetch_optional(&*self.db)
            .await?
            .ok_or(MetadataError::NotFound)
    }

    async fn record_recovered(&self, record: &ObjectRecord) -> MetadataResult<()> {
        let sql = format!(
            "INSERT INTO objects ({RECORD_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING"
        );
        sqlx::query(&sql)
            .bind(record.id)
            .bind(record.owner_id)
            .bind(record.parent_id)
            .bind(&record.name)
            .bind(record.is_folder)
            .bind(record.size_bytes)
            .bind(&record.checksum)
            .bind(&record.mime_type)
            .bind(&record.storage_path)
            .bind(record.revision)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> MetadataResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one == 1 {
            Ok(())
        } else {
            Err(MetadataError::Permanent(format!("unexpected result: {}", one)))
        }
    }
}

fn is_busy(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("locked") || message.contains("busy")
}
