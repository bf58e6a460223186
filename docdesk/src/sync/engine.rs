use docdesk_core::{DeskClient, DeskError, DocumentPage, DocumentQuery, FolderId, FolderRecord};
use parking_lot::RwLockReadGuard;
use tracing::{debug, info};

use super::cache::{DirectoryCache, Location, SharedCache};
use super::coordinator::{FolderCoordinator, FolderError};
use super::retry::ConflictRetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub page_size: u32,
    pub retry: ConflictRetry,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            retry: ConflictRetry::default(),
        }
    }
}

/// Outcome of a folder deletion as seen by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRemoval {
    pub folder: FolderId,
    /// Parent location, when the folder was known to the cache.
    pub parent: Option<Location>,
    pub deleted_documents: u64,
    pub dropped_folders: Vec<FolderId>,
}

/// Owns the directory cache and the single-flight coordinator; every folder mutation goes
/// through here so the cache stays consistent with what the server acknowledged.
#[derive(Clone)]
pub struct SyncEngine {
    client: DeskClient,
    cache: SharedCache,
    coordinator: FolderCoordinator,
    page_size: u32,
}

impl SyncEngine {
    pub fn new(client: DeskClient, settings: EngineSettings) -> Self {
        Self::with_cache(client, DirectoryCache::shared(), settings)
    }

    pub fn with_cache(client: DeskClient, cache: SharedCache, settings: EngineSettings) -> Self {
        let coordinator = FolderCoordinator::new(client.clone(), cache.clone(), settings.retry);
        Self {
            client,
            cache,
            coordinator,
            page_size: settings.page_size.max(1),
        }
    }

    pub fn client(&self) -> &DeskClient {
        &self.client
    }

    pub fn shared_cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Read access to the cache. Do not hold the guard across an `.await`.
    pub fn cache(&self) -> RwLockReadGuard<'_, DirectoryCache> {
        self.cache.read()
    }

    pub fn coordinator(&self) -> &FolderCoordinator {
        &self.coordinator
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Cached children of `parent`, fetching them only when the cache has no entry.
    pub async fn children(&self, parent: Location) -> Result<Vec<FolderRecord>, FolderError> {
        let cached = self.cache.read().get_children(parent).map(<[_]>::to_vec);
        if let Some(children) = cached {
            debug!(%parent, count = children.len(), "children served from cache");
            return Ok(children);
        }
        self.refresh_children(parent).await
    }

    pub async fn refresh_children(&self, parent: Location) -> Result<Vec<FolderRecord>, FolderError> {
        let folders = self.client.list_folders(parent.folder_id()).await?;
        debug!(%parent, count = folders.len(), "children fetched");
        self.cache.write().set_children(parent, folders.clone());
        Ok(folders)
    }

    pub async fn ensure_folder(&self, parent: Location, name: &str) -> Result<FolderRecord, FolderError> {
        self.coordinator.ensure_folder(parent, name).await
    }

    pub async fn ensure_path<S: AsRef<str>>(
        &self,
        base: Location,
        segments: &[S],
    ) -> Result<Location, FolderError> {
        self.coordinator.ensure_path(base, segments).await
    }

    pub async fn rename_folder(&self, id: FolderId, name: &str) -> Result<FolderRecord, FolderError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FolderError::EmptyName);
        }
        let record = self.client.rename_folder(id, name).await?;
        info!(id, name, "folder renamed");
        self.cache.write().update_record(record.clone());
        Ok(record)
    }

    pub async fn move_folder(&self, id: FolderId, target: Location) -> Result<FolderRecord, FolderError> {
        if let Location::Folder(target_id) = target {
            let cache = self.cache.read();
            if target_id == id || cache.is_descendant(target_id, id) {
                return Err(FolderError::InvalidMove(id));
            }
        }
        let record = self.client.move_folder(id, target.folder_id()).await?;
        info!(id, %target, "folder moved");
        let mut cache = self.cache.write();
        cache.update_record(record.clone());
        // Descendant paths changed server-side; drop the moved folder's listing.
        cache.invalidate(Location::Folder(id));
        Ok(record)
    }

    pub async fn delete_folder(&self, id: FolderId) -> Result<FolderRemoval, FolderError> {
        let deletion = self.client.delete_folder(id).await?;
        let mut cache = self.cache.write();
        let parent = cache.record(id).map(|record| Location::from(record.parent_id));
        let dropped_folders = cache.remove_subtree(id);
        info!(
            id,
            documents = deletion.deleted_count,
            folders = dropped_folders.len(),
            "folder deleted"
        );
        Ok(FolderRemoval {
            folder: id,
            parent,
            deleted_documents: deletion.deleted_count,
            dropped_folders,
        })
    }

    pub async fn documents(&self, location: Location, page: u32) -> Result<DocumentPage, DeskError> {
        let query = match location {
            Location::Root => DocumentQuery::at_root(page, self.page_size),
            Location::Folder(id) => DocumentQuery::in_folder(id, page, self.page_size),
        };
        self.client.list_documents(&query).await
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
