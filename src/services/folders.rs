//! Translates display paths such as `Documents/Reports/2024` into folder
//! identities held by the metadata store.

use crate::{
    models::object::ObjectRecord,
    services::{
        error::{StoreError, StoreResult},
        metadata::{MetadataStore, with_timeout},
    },
};
use std::{sync::Arc, time::Duration};
use tracing::debug;
use uuid::Uuid;

/// One resolved level of a display path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderLink {
    pub name: String,
    pub folder_id: Uuid,
    /// 1-based depth below the owner's root.
    pub depth: usize,
}

/// Ordered resolution result, root-most level first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FolderChain(pub Vec<FolderLink>);

impl FolderChain {
    /// Id of the deepest folder, `None` for the owner's root.
    pub fn leaf(&self) -> Option<Uuid> {
        self.0.last().map(|link| link.folder_id)
    }
}

/// Split a display path into segments, dropping empty and `.` segments.
///
/// Absolute paths and `..` segments are rejected.
pub fn split_display_path(path: &str) -> StoreResult<Vec<&str>> {
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(StoreError::invalid_path(path, "absolute paths are not allowed"));
    }
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(StoreError::invalid_path(path, "`..` segments are not allowed")),
            s if s.contains(['\\', '\0']) => {
                return Err(StoreError::invalid_path(path, "illegal character in segment"));
            }
            s => segments.push(s),
        }
    }
    Ok(segments)
}

#[derive(Clone)]
pub struct FolderPathResolver {
    metadata: Arc<dyn MetadataStore>,
    call_timeout: Duration,
}

impl FolderPathResolver {
    pub fn new(metadata: Arc<dyn MetadataStore>, call_timeout: Duration) -> Self {
        Self {
            metadata,
            call_timeout,
        }
    }

    /// Resolve `display_path`, creating any missing level.
    pub async fn ensure(&self, owner_id: Uuid, display_path: &str) -> StoreResult<Option<Uuid>> {
        Ok(self.ensure_chain(owner_id, display_path).await?.leaf())
    }

    pub async fn ensure_chain(&self, owner_id: Uuid, display_path: &str) -> StoreResult<FolderChain> {
        let mut chain = Vec::new();
        let mut parent_id = None;
        for (index, name) in split_display_path(display_path)?.into_iter().enumerate() {
            let folder = ObjectRecord::new_folder(owner_id, parent_id, name);
            let created = with_timeout(self.call_timeout, self.metadata.create_object(&folder)).await?;
            debug!("folder `{}` at depth {} -> {}", name, index + 1, created.id);
            parent_id = Some(created.id);
            chain.push(FolderLink {
                name: name.to_string(),
                folder_id: created.id,
                depth: index + 1,
            });
        }
        Ok(FolderChain(chain))
    }

    /// Resolve `display_path` without creating anything; fails on the first
    /// missing level.
    pub async fn find(&self, owner_id: Uuid, display_path: &str) -> StoreResult<Option<Uuid>> {
        Ok(self.find_chain(owner_id, display_path).await?.leaf())
    }

    pub async fn find_chain(&self, owner_id: Uuid, display_path: &str) -> StoreResult<FolderChain> {
        let mut chain = Vec::new();
        let mut parent_id = None;
        for (index, name) in split_display_path(display_path)?.into_iter().enumerate() {
            let children =
                with_timeout(self.call_timeout, self.metadata.list_children(owner_id, parent_id))
                    .await?;
            let folder = children
                .into_iter()
                .find(|child| child.is_folder && child.name == name)
                .ok_or_else(|| StoreError::NotFound(display_path.to_string()))?;
            parent_id = Some(folder.id);
            chain.push(FolderLink {
                name: name.to_string(),
                folder_id: folder.id,
                depth: index + 1,
            });
        }
        Ok(FolderChain(chain))
    }
}
