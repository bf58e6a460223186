use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use docdesk_core::{DocumentId, FolderId};
use tracing::debug;

use super::cache::Location;
use super::coordinator::FolderError;
use super::engine::SyncEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKey {
    Document(DocumentId),
    Folder(FolderId),
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Document(id) => write!(f, "file-{id}"),
            ItemKey::Folder(id) => write!(f, "folder-{id}"),
        }
    }
}

impl FromStr for ItemKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parse = |raw: &str| {
            raw.parse::<i64>()
                .map_err(|_| format!("invalid item key: {value}"))
        };
        if let Some(raw) = value.strip_prefix("file-") {
            return parse(raw).map(ItemKey::Document);
        }
        if let Some(raw) = value.strip_prefix("folder-") {
            return parse(raw).map(ItemKey::Folder);
        }
        Err(format!("invalid item key: {value}"))
    }
}

/// Every document and folder below a folder (the folder itself excluded).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SelectionClosure {
    pub documents: BTreeSet<DocumentId>,
    pub folders: BTreeSet<FolderId>,
}

impl SelectionClosure {
    pub fn keys(&self) -> impl Iterator<Item = ItemKey> + '_ {
        self.documents
            .iter()
            .map(|id| ItemKey::Document(*id))
            .chain(self.folders.iter().map(|id| ItemKey::Folder(*id)))
    }

    pub fn len(&self) -> usize {
        self.documents.len() + self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.folders.is_empty()
    }
}

/// Walks the live folder hierarchy below `folder`, paging through documents and listing
/// subfolders. A visited set keeps a malformed (cyclic) hierarchy from looping.
pub async fn resolve_closure(engine: &SyncEngine, folder: FolderId) -> Result<SelectionClosure, FolderError> {
    let mut closure = SelectionClosure::default();
    let mut visited = HashSet::new();
    let mut stack = vec![folder];

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        let location = Location::Folder(current);

        let mut page = 0;
        loop {
            let batch = engine.documents(location, page).await?;
            closure.documents.extend(batch.documents.iter().map(|doc| doc.id));
            if batch.is_last_page() {
                break;
            }
            page += 1;
        }

        for child in engine.refresh_children(location).await? {
            if child.id != folder {
                closure.folders.insert(child.id);
            }
            stack.push(child.id);
        }
    }

    debug!(
        folder,
        documents = closure.documents.len(),
        folders = closure.folders.len(),
        "selection closure resolved"
    );
    Ok(closure)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    keys: BTreeSet<ItemKey>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> &BTreeSet<ItemKey> {
        &self.keys
    }

    pub fn contains(&self, key: ItemKey) -> bool {
        self.keys.contains(&key)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn document_ids(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.keys.iter().filter_map(|key| match key {
            ItemKey::Document(id) => Some(*id),
            ItemKey::Folder(_) => None,
        })
    }

    pub async fn select_folder(&mut self, engine: &SyncEngine, folder: FolderId) -> Result<(), FolderError> {
        let closure = resolve_closure(engine, folder).await?;
        self.keys.insert(ItemKey::Folder(folder));
        self.keys.extend(closure.keys());
        Ok(())
    }

    pub async fn deselect_folder(&mut self, engine: &SyncEngine, folder: FolderId) -> Result<(), FolderError> {
        let closure = resolve_closure(engine, folder).await?;
        self.keys.remove(&ItemKey::Folder(folder));
        for key in closure.keys() {
            self.keys.remove(&key);
        }
        Ok(())
    }

    /// Replaces the selection with `next`, expanding folders that became selected and
    /// removing the closure of folders that became deselected. The selection is left
    /// untouched when a closure cannot be resolved.
    pub async fn apply(&mut self, engine: &SyncEngine, next: BTreeSet<ItemKey>) -> Result<(), FolderError> {
        let added: Vec<FolderId> = next
            .difference(&self.keys)
            .filter_map(folder_id)
            .collect();
        let removed: Vec<FolderId> = self
            .keys
            .difference(&next)
            .filter_map(folder_id)
            .collect();

        let mut result = next;
        for folder in added {
            result.extend(resolve_closure(engine, folder).await?.keys());
        }
        for folder in removed {
            let closure = resolve_closure(engine, folder).await?;
            for key in closure.keys() {
                result.remove(&key);
            }
        }
        self.keys = result;
        Ok(())
    }
}

fn folder_id(key: &ItemKey) -> Option<FolderId> {
    match key {
        ItemKey::Folder(id) => Some(*id),
        ItemKey::Document(_) => None,
    }
}
