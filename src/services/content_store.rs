//! Byte-level file operations beneath the storage root.
//!
//! Every call re-resolves its path through [`PathSandbox`]; a path validated
//! by an earlier call is never trusted, since sessions are long-lived and the
//! tree can change underneath them.

use crate::{
    models::object::StoredObject,
    services::{
        error::{StoreError, StoreResult},
        sandbox::PathSandbox,
    },
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut};
use sha2::{Digest, Sha256};
use std::{
    fmt, io,
    io::SeekFrom,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

/// Read buffer used when streaming files through a digest.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl FromStr for ChecksumAlgorithm {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            other => Err(StoreError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumAlgorithm::Md5 => write!(f, "md5"),
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// A directory entry with just enough stat info for tree walks and sweeps.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryInfo {
    pub name: String,
    pub is_directory: bool,
    /// The entry itself is a link; `is_directory` and `size` describe the link.
    pub is_symlink: bool,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ContentStore {
    sandbox: PathSandbox,
}

impl ContentStore {
    pub fn new(sandbox: PathSandbox) -> Self {
        Self { sandbox }
    }

    pub fn root(&self) -> &Path {
        self.sandbox.root()
    }

    /// Write `data` to `path`, replacing any previous content.
    ///
    /// Bytes land in a hidden temp file next to the target first and are
    /// renamed into place after fsync, so readers never see a torn file.
    pub async fn save(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let file_path = self.sandbox.resolve(path)?;
        reject_directory(path, &file_path).await?;
        let parent = parent_of(path, &file_path)?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(err) = write_and_sync(&tmp_path, data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        debug!("saved {} bytes to {}", data.len(), file_path.display());
        Ok(())
    }

    pub async fn read(&self, path: &str) -> StoreResult<Bytes> {
        let file_path = self.sandbox.resolve(path)?;
        reject_directory(path, &file_path).await?;
        let data = fs::read(&file_path)
            .await
            .map_err(|err| StoreError::from_io(path, err))?;
        Ok(Bytes::from(data))
    }

    /// Read exactly `len` bytes starting at `offset`.
    pub async fn read_range(&self, path: &str, offset: u64, len: u64) -> StoreResult<Bytes> {
        let file_path = self.sandbox.resolve(path)?;
        reject_directory(path, &file_path).await?;
        let mut file = File::open(&file_path)
            .await
            .map_err(|err| StoreError::from_io(path, err))?;
        let size = file.metadata().await?.len();
        let end = offset.saturating_add(len);
        if len == 0 || end > size {
            return Err(StoreError::RangeOutOfBounds {
                start: offset,
                end: end.saturating_sub(1),
                size,
            });
        }

        let capacity = usize::try_from(len).map_err(|_| StoreError::RangeOutOfBounds {
            start: offset,
            end: end - 1,
            size,
        })?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; capacity];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Remove a file, or a directory and everything below it.
    pub async fn delete(&self, path: &str) -> StoreResult<()> {
        let file_path = self.sandbox.resolve(path)?;
        if file_path == self.sandbox.root() {
            return Err(StoreError::invalid_path(path, "cannot delete the storage root"));
        }
        let meta = fs::symlink_metadata(&file_path)
            .await
            .map_err(|err| StoreError::from_io(path, err))?;
        if meta.is_dir() {
            fs::remove_dir_all(&file_path).await?;
        } else {
            fs::remove_file(&file_path).await?;
        }
        debug!("removed {}", file_path.display());
        Ok(())
    }

    /// Rename `old_path` to `new_path`, creating parents of the destination.
    pub async fn move_to(&self, old_path: &str, new_path: &str) -> StoreResult<()> {
        let from = self.sandbox.resolve(old_path)?;
        let to = self.sandbox.resolve(new_path)?;
        fs::symlink_metadata(&from)
            .await
            .map_err(|err| StoreError::from_io(old_path, err))?;
        fs::create_dir_all(parent_of(new_path, &to)?).await?;
        fs::rename(&from, &to).await?;
        debug!("moved {} -> {}", from.display(), to.display());
        Ok(())
    }

    /// Copy a single file, creating parents of the destination.
    pub async fn copy(&self, src: &str, dst: &str) -> StoreResult<()> {
        let from = self.sandbox.resolve(src)?;
        let to = self.sandbox.resolve(dst)?;
        reject_directory(src, &from).await?;
        fs::create_dir_all(parent_of(dst, &to)?).await?;
        fs::copy(&from, &to)
            .await
            .map_err(|err| StoreError::from_io(src, err))?;
        Ok(())
    }

    /// Entry names directly inside `dir_path`, sorted.
    pub async fn list(&self, dir_path: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .list_entries(dir_path)
            .await?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    /// Entries directly inside `dir_path` with their stat info, sorted by name.
    pub async fn list_entries(&self, dir_path: &str) -> StoreResult<Vec<EntryInfo>> {
        let dir = self.sandbox.resolve(dir_path)?;
        let mut reader = fs::read_dir(&dir)
            .await
            .map_err(|err| StoreError::from_io(dir_path, err))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                debug!("skipping non UTF-8 entry in {}", dir.display());
                continue;
            };
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                // Raced with a delete.
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(StoreError::Io(err)),
            };
            entries.push(EntryInfo {
                name,
                is_directory: meta.is_dir(),
                is_symlink: meta.file_type().is_symlink(),
                size: meta.len(),
                modified_at: modified_at(&meta),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Stat a file and hash it.
    pub async fn stat(&self, path: &str) -> StoreResult<StoredObject> {
        let file_path = self.sandbox.resolve(path)?;
        let meta = fs::metadata(&file_path)
            .await
            .map_err(|err| StoreError::from_io(path, err))?;
        if meta.is_dir() {
            return Err(StoreError::IsDirectory(path.to_string()));
        }
        let (md5, sha256) = hash_file(&file_path).await?;
        Ok(StoredObject {
            path: path.to_string(),
            size: meta.len(),
            is_directory: false,
            modified_at: modified_at(&meta),
            md5,
            sha256,
        })
    }

    /// Size of a regular file without hashing it.
    pub async fn size(&self, path: &str) -> StoreResult<u64> {
        let file_path = self.sandbox.resolve(path)?;
        let meta = fs::metadata(&file_path)
            .await
            .map_err(|err| StoreError::from_io(path, err))?;
        if meta.is_dir() {
            return Err(StoreError::IsDirectory(path.to_string()));
        }
        Ok(meta.len())
    }

    pub async fn exists(&self, path: &str) -> StoreResult<bool> {
        let file_path = self.sandbox.resolve(path)?;
        Ok(fs::try_exists(&file_path).await?)
    }

    /// Lowercase hex digest of the file, streamed through the hasher once.
    pub async fn checksum(&self, path: &str, algorithm: ChecksumAlgorithm) -> StoreResult<String> {
        let file_path = self.sandbox.resolve(path)?;
        reject_directory(path, &file_path).await?;
        let mut file = File::open(&file_path)
            .await
            .map_err(|err| StoreError::from_io(path, err))?;

        let mut buf = vec![0u8; HASH_BUFFER_SIZE];
        match algorithm {
            ChecksumAlgorithm::Md5 => {
                let mut digest = md5::Context::new();
                loop {
                    let n = file.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    digest.consume(&buf[..n]);
                }
                Ok(format!("{:x}", digest.compute()))
            }
            ChecksumAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let n = file.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(format!("{:x}", hasher.finalize()))
            }
        }
    }

    pub async fn create_dir(&self, path: &str) -> StoreResult<()> {
        let dir = self.sandbox.resolve(path)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    /// Write a stream of bytes at `offset`, creating the file if needed and
    /// leaving bytes outside the written range untouched.
    ///
    /// Returns the number of bytes written. A write cut short (error or a
    /// dropped future) leaves a partial range that a later call at the same
    /// offset simply overwrites.
    pub async fn write_at<S>(&self, path: &str, offset: u64, stream: S) -> StoreResult<u64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let file_path = self.sandbox.resolve(path)?;
        reject_directory(path, &file_path).await?;
        fs::create_dir_all(parent_of(path, &file_path)?).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&file_path)
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut written: u64 = 0;
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_data().await?;
        debug!(
            "wrote {} bytes at offset {} to {}",
            written,
            offset,
            file_path.display()
        );
        Ok(written)
    }
}

/// Stream a file once through both MD5 and SHA-256.
async fn hash_file(path: &Path) -> io::Result<(String, String)> {
    let mut file = File::open(path).await?;
    let mut md5 = md5::Context::new();
    let mut sha = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        md5.consume(&buf[..n]);
        sha.update(&buf[..n]);
    }
    Ok((format!("{:x}", md5.compute()), format!("{:x}", sha.finalize())))
}

async fn write_and_sync(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

async fn reject_directory(path: &str, file_path: &Path) -> StoreResult<()> {
    match fs::metadata(file_path).await {
        Ok(meta) if meta.is_dir() => Err(StoreError::IsDirectory(path.to_string())),
        _ => Ok(()),
    }
}

fn parent_of(path: &str, file_path: &Path) -> StoreResult<PathBuf> {
    file_path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| StoreError::invalid_path(path, "path has no parent directory"))
}

fn modified_at(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn store(dir: &tempfile::TempDir) -> ContentStore {
        ContentStore::new(PathSandbox::new(dir.path()).unwrap())
    }

    fn once(data: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::once(async move { Ok(Bytes::from_static(data)) })
    }

    #[tokio::test]
    async fn save_read_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.save("owner/docs/a.txt", b"hello").await.unwrap();
        assert_eq!(store.read("owner/docs/a.txt").await.unwrap(), "hello");
        assert_eq!(store.list("owner/docs").await.unwrap(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn read_and_stat_on_directory_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.create_dir("owner/docs").await.unwrap();

        assert!(matches!(
            store.read("owner/docs").await,
            Err(StoreError::IsDirectory(_))
        ));
        assert!(matches!(
            store.stat("owner/docs").await,
            Err(StoreError::IsDirectory(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.read("nope.txt").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("nope.txt").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn move_copy_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.save("a.txt", b"abc").await.unwrap();

        store.copy("a.txt", "x/y/b.txt").await.unwrap();
        store.move_to("a.txt", "z/c.txt").await.unwrap();

        assert!(!store.exists("a.txt").await.unwrap());
        assert_eq!(store.read("x/y/b.txt").await.unwrap(), "abc");
        assert_eq!(store.read("z/c.txt").await.unwrap(), "abc");

        store.delete("x").await.unwrap();
        assert!(!store.exists("x/y/b.txt").await.unwrap());
    }

    #[tokio::test]
    async fn escaping_paths_never_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.save("../evil.txt", b"x").await,
            Err(StoreError::PathEscape(_))
        ));
        assert!(matches!(
            store.move_to("a", "/tmp/evil").await,
            Err(StoreError::PathEscape(_))
        ));
    }

    #[tokio::test]
    async fn checksums_match_known_digests() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.save("abc.txt", b"abc").await.unwrap();

        let md5 = store.checksum("abc.txt", ChecksumAlgorithm::Md5).await.unwrap();
        let sha = store
            .checksum("abc.txt", "SHA256".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            sha,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let stat = store.stat("abc.txt").await.unwrap();
        assert_eq!(stat.size, 3);
        assert_eq!(stat.md5, md5);
        assert_eq!(stat.sha256, sha);
        assert!("crc32".parse::<ChecksumAlgorithm>().is_err());
    }

    #[tokio::test]
    async fn positional_writes_fill_gaps_in_any_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        assert_eq!(store.write_at("temp/s", 5, once(b"world")).await.unwrap(), 5);
        store.write_at("temp/s", 0, once(b"hello")).await.unwrap();
        // identical retry is harmless
        store.write_at("temp/s", 5, once(b"world")).await.unwrap();

        assert_eq!(store.read("temp/s").await.unwrap(), "helloworld");
        assert_eq!(store.read_range("temp/s", 3, 4).await.unwrap(), "lowo");
        assert!(matches!(
            store.read_range("temp/s", 8, 5).await,
            Err(StoreError::RangeOutOfBounds { .. })
        ));
    }
}
