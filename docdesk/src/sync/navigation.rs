use std::collections::HashSet;
use std::fmt;

use docdesk_core::{FolderId, FolderRecord};

use super::cache::{DirectoryCache, Location};

type NavigationListener = Box<dyn FnMut(Location) + Send>;

/// Browser-style back/forward history over folder locations.
///
/// History starts at the root. Navigating from the middle of the history drops the forward
/// entries, and the oldest entries fall off once the configured limit is reached.
pub struct Navigator {
    history: Vec<Location>,
    cursor: usize,
    limit: usize,
    listener: Option<NavigationListener>,
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("history", &self.history)
            .field("cursor", &self.cursor)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Navigator {
    pub fn new(limit: usize) -> Self {
        Self {
            history: vec![Location::Root],
            cursor: 0,
            limit: limit.max(1),
            listener: None,
        }
    }

    /// Called on every location change so the owner can reset selection and search state.
    pub fn on_change(&mut self, listener: impl FnMut(Location) + Send + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn current(&self) -> Location {
        self.history[self.cursor]
    }

    pub fn history(&self) -> &[Location] {
        &self.history
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn navigate(&mut self, location: Location) {
        self.history.truncate(self.cursor + 1);
        self.history.push(location);
        if self.history.len() > self.limit {
            let overflow = self.history.len() - self.limit;
            self.history.drain(..overflow);
        }
        self.cursor = self.history.len() - 1;
        self.notify();
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor + 1 < self.history.len()
    }

    pub fn can_go_up(&self) -> bool {
        self.current() != Location::Root
    }

    /// Returns the new location, or `None` when already at the oldest entry.
    pub fn back(&mut self) -> Option<Location> {
        if !self.can_go_back() {
            return None;
        }
        self.cursor -= 1;
        self.notify();
        Some(self.current())
    }

    pub fn forward(&mut self) -> Option<Location> {
        if !self.can_go_forward() {
            return None;
        }
        self.cursor += 1;
        self.notify();
        Some(self.current())
    }

    /// Navigates to the cached parent of the current folder. No-op at the root or when the
    /// current folder is not in the cache.
    pub fn up(&mut self, cache: &DirectoryCache) -> Option<Location> {
        let Location::Folder(id) = self.current() else {
            return None;
        };
        let parent = Location::from(cache.record(id)?.parent_id);
        self.navigate(parent);
        Some(parent)
    }

    /// Root-to-current trail of cached folders. A missing record or a parent cycle cuts the
    /// trail short instead of looping.
    pub fn breadcrumb(&self, cache: &DirectoryCache) -> Vec<FolderRecord> {
        let Location::Folder(id) = self.current() else {
            return Vec::new();
        };
        breadcrumb_for(cache, id)
    }

    /// Moves off a folder that was just deleted.
    pub fn handle_removed(&mut self, folder: FolderId, parent: Option<Location>) {
        if self.current() == Location::Folder(folder) {
            self.navigate(parent.unwrap_or(Location::Root));
        }
    }

    fn notify(&mut self) {
        let current = self.current();
        if let Some(listener) = self.listener.as_mut() {
            listener(current);
        }
    }
}

pub fn breadcrumb_for(cache: &DirectoryCache, folder: FolderId) -> Vec<FolderRecord> {
    let mut trail = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(folder);
    while let Some(id) = current {
        if !visited.insert(id) {
            break;
        }
        let Some(record) = cache.record(id) else {
            break;
        };
        trail.push(record.clone());
        current = record.parent_id;
    }
    trail.reverse();
    trail
}
