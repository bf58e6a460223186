use std::collections::HashMap;
use std::sync::Arc;

use docdesk_core::{ApiErrorClass, DeskClient, DeskError, FolderId, FolderRecord};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::cache::{Location, SharedCache};
use super::retry::ConflictRetry;

#[derive(Debug, Clone, Error)]
pub enum FolderError {
    #[error("api error: {0}")]
    Api(Arc<DeskError>),
    #[error("folder name is empty")]
    EmptyName,
    #[error("folder {0} is not in the directory cache")]
    UnknownFolder(FolderId),
    #[error("folder {0} cannot be moved into itself or one of its descendants")]
    InvalidMove(FolderId),
}

impl From<DeskError> for FolderError {
    fn from(err: DeskError) -> Self {
        FolderError::Api(Arc::new(err))
    }
}

impl FolderError {
    pub fn classification(&self) -> ApiErrorClass {
        match self {
            FolderError::Api(err) => err.classification(),
            FolderError::EmptyName | FolderError::UnknownFolder(_) | FolderError::InvalidMove(_) => {
                ApiErrorClass::Validation
            }
        }
    }
}

type Outcome = Result<FolderRecord, FolderError>;
type PendingCreation = watch::Receiver<Option<Outcome>>;
type PendingMap = Mutex<HashMap<String, PendingCreation>>;

enum Claim {
    Cached(FolderRecord),
    Wait(PendingCreation),
    Lead(watch::Sender<Option<Outcome>>),
}

/// Removes the registry entry when the leading call finishes or is dropped mid-flight.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    key: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.key);
    }
}

/// Single-flight folder creation keyed by `parent:name`.
///
/// Every concurrent caller for the same key shares one outcome and at most one create
/// request reaches the server. A sibling-name conflict is reconciled by re-listing the
/// parent, so a folder that appeared through another client is adopted instead of failing.
#[derive(Clone)]
pub struct FolderCoordinator {
    client: DeskClient,
    cache: SharedCache,
    pending: Arc<PendingMap>,
    retry: ConflictRetry,
}

impl FolderCoordinator {
    pub fn new(client: DeskClient, cache: SharedCache, retry: ConflictRetry) -> Self {
        Self {
            client,
            cache,
            pending: Arc::new(Mutex::new(HashMap::new())),
            retry,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    pub async fn ensure_folder(&self, parent: Location, name: &str) -> Outcome {
        let name = name.trim();
        if name.is_empty() {
            return Err(FolderError::EmptyName);
        }
        let key = pending_key(parent, name);

        loop {
            match self.claim(&key, parent, name) {
                Claim::Cached(record) => {
                    debug!(%parent, name, id = record.id, "folder found in cache");
                    return Ok(record);
                }
                Claim::Wait(mut rx) => {
                    debug!(%parent, name, "waiting on in-flight folder creation");
                    let shared = rx
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|value| (*value).clone());
                    match shared {
                        Some(outcome) => return outcome,
                        None => {
                            debug!(%parent, name, "folder creation abandoned, retrying");
                            continue;
                        }
                    }
                }
                Claim::Lead(tx) => {
                    let _guard = PendingGuard {
                        pending: &self.pending,
                        key: &key,
                    };
                    let outcome = self.create_or_reconcile(parent, name).await;
                    tx.send_replace(Some(outcome.clone()));
                    return outcome;
                }
            }
        }
    }

    /// Resolves each segment in turn below `base` and returns the terminal location.
    pub async fn ensure_path<S: AsRef<str>>(
        &self,
        base: Location,
        segments: &[S],
    ) -> Result<Location, FolderError> {
        let mut current = base;
        for segment in segments {
            let record = self.ensure_folder(current, segment.as_ref()).await?;
            current = Location::Folder(record.id);
        }
        Ok(current)
    }

    // Registry first, then cache; neither lock survives past this call.
    fn claim(&self, key: &str, parent: Location, name: &str) -> Claim {
        let mut pending = self.pending.lock();
        if let Some(rx) = pending.get(key) {
            return Claim::Wait(rx.clone());
        }
        if let Some(record) = self.cache.read().find_child(parent, name) {
            return Claim::Cached(record.clone());
        }
        let (tx, rx) = watch::channel(None);
        pending.insert(key.to_string(), rx);
        Claim::Lead(tx)
    }

    async fn create_or_reconcile(&self, parent: Location, name: &str) -> Outcome {
        if let Some(existing) = self.refetch_child(parent, name).await? {
            debug!(%parent, name, id = existing.id, "folder appeared on refetch");
            return Ok(existing);
        }

        match self.client.create_folder(name, parent.folder_id()).await {
            Ok(record) => {
                info!(%parent, name, id = record.id, "folder created");
                self.cache.write().update_record(record.clone());
                Ok(record)
            }
            Err(err) if err.is_name_conflict() => {
                warn!(%parent, name, error = %err, "sibling name conflict, reconciling");
                self.reconcile_conflict(parent, name, err).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn reconcile_conflict(&self, parent: Location, name: &str, original: DeskError) -> Outcome {
        let mut attempt = 0;
        while let Some(delay) = self.retry.delay_before(attempt) {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(existing) = self.refetch_child(parent, name).await? {
                info!(%parent, name, id = existing.id, attempt, "adopted concurrently created folder");
                return Ok(existing);
            }
            attempt += 1;
        }
        Err(original.into())
    }

    async fn refetch_child(&self, parent: Location, name: &str) -> Result<Option<FolderRecord>, FolderError> {
        let folders = self.client.list_folders(parent.folder_id()).await?;
        let mut cache = self.cache.write();
        cache.set_children(parent, folders);
        Ok(cache.find_child(parent, name).cloned())
    }
}

fn pending_key(parent: Location, name: &str) -> String {
    format!("{parent}:{name}")
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
