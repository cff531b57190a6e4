//! Recovers objects the metadata store has no record of.
//!
//! This is the slow path: a depth-first walk of the owner's whole tree,
//! decoding each file name until one carries the requested id. The metadata
//! store is always asked first; callers keep the two lookups separate so a
//! recovery stays visible in the logs.

use crate::{
    models::object::RecoveredObject,
    services::{
        content_store::ContentStore,
        error::{StoreError, StoreResult},
        naming,
    },
};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Reconciler {
    content: ContentStore,
}

impl Reconciler {
    pub fn new(content: ContentStore) -> Self {
        Self { content }
    }

    /// Find `object_id` under `{owner_id}/`.
    ///
    /// `NotFound` here means the object does not exist anywhere.
    pub async fn recover(&self, owner_id: Uuid, object_id: Uuid) -> StoreResult<RecoveredObject> {
        let owner_root = owner_id.to_string();
        let not_found = || StoreError::NotFound(object_id.to_string());

        let mut pending = vec![owner_root];
        let mut visited = 0usize;
        while let Some(dir) = pending.pop() {
            let entries = match self.content.list_entries(&dir).await {
                Ok(entries) => entries,
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };

            let mut subdirs = Vec::new();
            for entry in entries {
                visited += 1;
                if entry.is_symlink {
                    debug!("skipping link {}/{}", dir, entry.name);
                    continue;
                }
                let path = format!("{}/{}", dir, entry.name);
                if entry.is_directory {
                    subdirs.push(path);
                    continue;
                }
                let Ok(identity) = naming::decode(&entry.name) else {
                    continue;
                };
                if identity.id != object_id {
                    continue;
                }

                let object = self.content.stat(&path).await?;
                info!(
                    "recovered object {} for owner {} at {} after {} entries",
                    object_id, owner_id, path, visited
                );
                return Ok(RecoveredObject { identity, object });
            }
            // Reverse so the stack pops directories in listing order.
            pending.extend(subdirs.into_iter().rev());
        }

        debug!(
            "object {} not found for owner {} after {} entries",
            object_id, owner_id, visited
        );
        Err(not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sandbox::PathSandbox;

    fn setup() -> (tempfile::TempDir, ContentStore, Reconciler) {
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::new(PathSandbox::new(dir.path()).unwrap());
        let reconciler = Reconciler::new(content.clone());
        (dir, content, reconciler)
    }

    #[tokio::test]
    async fn finds_nested_file_by_id() {
        let (_dir, content, reconciler) = setup();
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();
        let name = naming::encode(id, "q3.pdf").unwrap();
        content
            .save(&format!("{owner}/Documents/Reports/{name}"), b"numbers")
            .await
            .unwrap();
        content
            .save(&format!("{owner}/Documents/unrelated.txt"), b"x")
            .await
            .unwrap();

        let found = reconciler.recover(owner, id).await.unwrap();
        assert_eq!(found.identity.id, id);
        assert_eq!(found.identity.display_name, "q3.pdf");
        assert_eq!(found.object.size, 7);
        assert_eq!(found.object.path, format!("{owner}/Documents/Reports/{name}"));
    }

    #[tokio::test]
    async fn recovering_twice_is_stable() {
        let (_dir, content, reconciler) = setup();
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();
        let name = naming::encode(id, "notes").unwrap();
        content
            .save(&format!("{owner}/{name}"), b"same bytes")
            .await
            .unwrap();

        let first = reconciler.recover(owner, id).await.unwrap();
        let second = reconciler.recover(owner, id).await.unwrap();
        assert_eq!(first.object.path, second.object.path);
        assert_eq!(first.object.size, second.object.size);
        assert_eq!(first.object.md5, second.object.md5);
        assert_eq!(first.object.sha256, second.object.sha256);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn links_are_skipped_during_the_walk() {
        let (dir, content, reconciler) = setup();
        let outside = tempfile::tempdir().unwrap();
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();
        let name = naming::encode(id, "a.txt").unwrap();

        let target = outside.path().join("secret.txt");
        std::fs::write(&target, b"outside").unwrap();
        let owner_dir = dir.path().join(owner.to_string());
        std::fs::create_dir_all(&owner_dir).unwrap();
        std::os::unix::fs::symlink(&target, owner_dir.join(&name)).unwrap();
        std::os::unix::fs::symlink(outside.path(), owner_dir.join("elsewhere")).unwrap();

        // Only the link carries the id: nothing to recover.
        assert!(matches!(
            reconciler.recover(owner, id).await,
            Err(StoreError::NotFound(_))
        ));

        // The link sorts first; the real file further down is still found.
        content
            .save(&format!("{owner}/zz/{name}"), b"inside")
            .await
            .unwrap();
        let found = reconciler.recover(owner, id).await.unwrap();
        assert_eq!(found.object.path, format!("{owner}/zz/{name}"));
        assert_eq!(found.object.size, 6);
    }

    #[tokio::test]
    async fn other_owners_and_missing_trees_are_not_found() {
        let (_dir, content, reconciler) = setup();
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();
        let name = naming::encode(id, "mine.txt").unwrap();
        content.save(&format!("{owner}/{name}"), b"x").await.unwrap();

        assert!(matches!(
            reconciler.recover(Uuid::new_v4(), id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            reconciler.recover(owner, Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
