use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use docdesk_core::{FolderId, FolderRecord};
use parking_lot::RwLock;

/// A folder listing position: the workspace root or a concrete folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    Root,
    Folder(FolderId),
}

impl Location {
    pub fn folder_id(self) -> Option<FolderId> {
        match self {
            Location::Root => None,
            Location::Folder(id) => Some(id),
        }
    }
}

impl From<Option<FolderId>> for Location {
    fn from(value: Option<FolderId>) -> Self {
        value.map_or(Location::Root, Location::Folder)
    }
}

impl From<FolderId> for Location {
    fn from(value: FolderId) -> Self {
        Location::Folder(value)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Root => f.write_str("root"),
            Location::Folder(id) => write!(f, "{id}"),
        }
    }
}

pub type SharedCache = Arc<RwLock<DirectoryCache>>;

/// Per-parent child listings plus a flat id lookup. Pure in-memory; never talks to the API.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    children: HashMap<Location, Vec<FolderRecord>>,
    records: HashMap<FolderId, FolderRecord>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedCache {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn get_children(&self, parent: Location) -> Option<&[FolderRecord]> {
        self.children.get(&parent).map(Vec::as_slice)
    }

    pub fn is_loaded(&self, parent: Location) -> bool {
        self.children.contains_key(&parent)
    }

    /// Replaces the whole entry for `parent`. Lookup records that still point at this parent
    /// but are missing from the fresh listing are dropped.
    pub fn set_children(&mut self, parent: Location, records: Vec<FolderRecord>) {
        let fresh: HashSet<FolderId> = records.iter().map(|record| record.id).collect();
        self.records.retain(|id, record| {
            Location::from(record.parent_id) != parent || fresh.contains(id)
        });
        for record in &records {
            self.records.insert(record.id, record.clone());
        }
        self.children.insert(parent, records);
    }

    pub fn update_record(&mut self, record: FolderRecord) {
        let new_parent = Location::from(record.parent_id);
        if let Some(previous) = self.records.get(&record.id) {
            let old_parent = Location::from(previous.parent_id);
            if old_parent != new_parent
                && let Some(entry) = self.children.get_mut(&old_parent)
            {
                entry.retain(|child| child.id != record.id);
            }
        }
        if let Some(entry) = self.children.get_mut(&new_parent) {
            match entry.iter_mut().find(|child| child.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => entry.push(record.clone()),
            }
        }
        self.records.insert(record.id, record);
    }

    pub fn remove_record(&mut self, id: FolderId) -> Option<FolderRecord> {
        let removed = self.records.remove(&id)?;
        if let Some(entry) = self.children.get_mut(&Location::from(removed.parent_id)) {
            entry.retain(|child| child.id != id);
        }
        Some(removed)
    }

    /// Drops a folder together with every cached descendant listing and record.
    pub fn remove_subtree(&mut self, id: FolderId) -> Vec<FolderId> {
        let mut removed = Vec::new();
        let mut stack = vec![id];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(children) = self.children.remove(&Location::Folder(current)) {
                stack.extend(children.iter().map(|child| child.id));
            }
            stack.extend(
                self.records
                    .values()
                    .filter(|record| record.parent_id == Some(current))
                    .map(|record| record.id),
            );
            if self.remove_record(current).is_some() {
                removed.push(current);
            }
        }
        removed
    }

    pub fn invalidate(&mut self, parent: Location) {
        self.children.remove(&parent);
    }

    pub fn record(&self, id: FolderId) -> Option<&FolderRecord> {
        self.records.get(&id)
    }

    pub fn find_child(&self, parent: Location, name: &str) -> Option<&FolderRecord> {
        self.children
            .get(&parent)?
            .iter()
            .find(|child| child.name == name)
    }

    /// True when `candidate` sits below `ancestor` according to cached parent links.
    pub fn is_descendant(&self, candidate: FolderId, ancestor: FolderId) -> bool {
        let mut visited = HashSet::new();
        let mut current = self.records.get(&candidate).and_then(|r| r.parent_id);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            if !visited.insert(id) {
                return false;
            }
            current = self.records.get(&id).and_then(|r| r.parent_id);
        }
        false
    }

    pub fn loaded_locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.children.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: FolderId, name: &str, parent_id: Option<FolderId>) -> FolderRecord {
        FolderRecord {
            id,
            name: name.to_string(),
            parent_id,
            path: format!("/{name}"),
            depth: 0,
            created_at: None,
        }
    }

    #[test]
    fn set_children_replaces_entry_wholesale() {
        let mut cache = DirectoryCache::new();
        cache.set_children(
            Location::Root,
            vec![folder(1, "A", None), folder(2, "B", None)],
        );
        cache.set_children(Location::Root, vec![folder(2, "B", None)]);

        let names: Vec<_> = cache
            .get_children(Location::Root)
            .unwrap()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["B"]);
        assert!(cache.record(1).is_none());
        assert!(cache.record(2).is_some());
    }

    #[test]
    fn absent_entry_differs_from_empty_entry() {
        let mut cache = DirectoryCache::new();
        assert!(cache.get_children(Location::Folder(7)).is_none());
        cache.set_children(Location::Folder(7), Vec::new());
        assert_eq!(cache.get_children(Location::Folder(7)).unwrap().len(), 0);
    }

    #[test]
    fn update_record_appends_only_when_absent() {
        let mut cache = DirectoryCache::new();
        cache.set_children(Location::Folder(5), vec![folder(9, "Reports", Some(5))]);
        cache.update_record(folder(9, "Reports", Some(5)));
        cache.update_record(folder(10, "Scans", Some(5)));

        let entry = cache.get_children(Location::Folder(5)).unwrap();
        assert_eq!(entry.len(), 2);
        assert_eq!(cache.record(10).unwrap().name, "Scans");
    }

    #[test]
    fn update_record_without_cached_parent_only_touches_lookup() {
        let mut cache = DirectoryCache::new();
        cache.update_record(folder(3, "Inbox", Some(99)));
        assert!(cache.get_children(Location::Folder(99)).is_none());
        assert!(cache.record(3).is_some());
    }

    #[test]
    fn moved_record_leaves_old_parent_entry() {
        let mut cache = DirectoryCache::new();
        cache.set_children(Location::Root, vec![folder(1, "A", None)]);
        cache.set_children(Location::Folder(2), Vec::new());
        cache.update_record(folder(1, "A", Some(2)));

        assert!(cache.get_children(Location::Root).unwrap().is_empty());
        assert_eq!(cache.get_children(Location::Folder(2)).unwrap()[0].id, 1);
    }

    #[test]
    fn remove_record_drops_from_parent_entry() {
        let mut cache = DirectoryCache::new();
        cache.set_children(Location::Root, vec![folder(1, "A", None)]);
        assert!(cache.remove_record(1).is_some());
        assert!(cache.get_children(Location::Root).unwrap().is_empty());
        assert!(cache.remove_record(1).is_none());
    }

    #[test]
    fn remove_subtree_drops_descendants() {
        let mut cache = DirectoryCache::new();
        cache.set_children(Location::Root, vec![folder(1, "A", None)]);
        cache.set_children(Location::Folder(1), vec![folder(2, "B", Some(1))]);
        cache.set_children(Location::Folder(2), vec![folder(3, "C", Some(2))]);

        let mut removed = cache.remove_subtree(1);
        removed.sort();
        assert_eq!(removed, vec![1, 2, 3]);
        assert!(cache.get_children(Location::Root).unwrap().is_empty());
        assert!(!cache.is_loaded(Location::Folder(1)));
        assert!(cache.record(3).is_none());
    }

    #[test]
    fn descendant_check_stops_on_cycles() {
        let mut cache = DirectoryCache::new();
        cache.update_record(folder(1, "A", Some(2)));
        cache.update_record(folder(2, "B", Some(1)));
        assert!(cache.is_descendant(1, 2));
        assert!(!cache.is_descendant(1, 42));
    }
}
