use std::collections::{BTreeSet, HashSet};

use docdesk_core::{FolderId, FolderRecord};

use super::cache::{DirectoryCache, Location};
use super::coordinator::FolderError;
use super::engine::SyncEngine;

/// Tree node derived from the directory cache; rebuildable at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub key: Location,
    /// `None` only for the root node.
    pub folder: Option<FolderRecord>,
    /// `None` until the node's children are in the cache.
    pub children: Option<Vec<TreeNode>>,
    pub loaded: bool,
}

impl TreeNode {
    pub fn name(&self) -> &str {
        self.folder.as_ref().map_or("", |folder| folder.name.as_str())
    }

    pub fn child_nodes(&self) -> &[TreeNode] {
        self.children.as_deref().unwrap_or_default()
    }
}

/// Turns a node into the text a front end shows for it.
pub trait LabelRenderer {
    fn label(&self, node: &TreeNode) -> String;
}

impl<F> LabelRenderer for F
where
    F: Fn(&TreeNode) -> String,
{
    fn label(&self, node: &TreeNode) -> String {
        self(node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub key: Location,
    pub depth: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredTree {
    pub root: TreeNode,
    /// Keys to expand so every match is visible.
    pub expanded: BTreeSet<Location>,
}

#[derive(Debug, Default, Clone)]
pub struct TreeViewModel {
    expanded: BTreeSet<Location>,
}

impl TreeViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expanded(&self) -> &BTreeSet<Location> {
        &self.expanded
    }

    pub fn is_expanded(&self, key: Location) -> bool {
        self.expanded.contains(&key)
    }

    pub fn collapse(&mut self, key: Location) {
        self.expanded.remove(&key);
    }

    pub async fn load_root(&mut self, engine: &SyncEngine) -> Result<TreeNode, FolderError> {
        engine.children(Location::Root).await?;
        self.expanded.insert(Location::Root);
        Ok(Self::root(&engine.cache()))
    }

    pub async fn load_children_of(
        &mut self,
        engine: &SyncEngine,
        folder: FolderId,
    ) -> Result<TreeNode, FolderError> {
        let key = Location::Folder(folder);
        engine.children(key).await?;
        self.expanded.insert(key);
        let cache = engine.cache();
        let record = cache.record(folder).cloned();
        let mut visited = HashSet::from([folder]);
        Ok(TreeNode {
            key,
            folder: record,
            children: build_children(&cache, key, &mut visited),
            loaded: true,
        })
    }

    /// Whole cached tree under a synthetic root node.
    pub fn root(cache: &DirectoryCache) -> TreeNode {
        let mut visited = HashSet::new();
        TreeNode {
            key: Location::Root,
            folder: None,
            children: build_children(cache, Location::Root, &mut visited),
            loaded: cache.is_loaded(Location::Root),
        }
    }

    /// Case-insensitive name search over loaded nodes. A node survives when it matches or
    /// has a surviving descendant; only ancestors of matches are marked for expansion.
    pub fn filter(cache: &DirectoryCache, query: &str) -> FilteredTree {
        let root = Self::root(cache);
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return FilteredTree {
                root,
                expanded: BTreeSet::new(),
            };
        }

        let mut expanded = BTreeSet::new();
        let kept = filter_nodes(root.child_nodes(), &needle, &mut expanded);
        if !kept.is_empty() {
            expanded.insert(Location::Root);
        }
        FilteredTree {
            root: TreeNode {
                children: Some(kept),
                ..root
            },
            expanded,
        }
    }

    /// Expands every cached ancestor of `folder`. Stops on a parent cycle.
    pub fn expand_to(&mut self, cache: &DirectoryCache, folder: FolderId) {
        self.expanded.insert(Location::Root);
        let mut visited = HashSet::from([folder]);
        let mut current = cache.record(folder).and_then(|record| record.parent_id);
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            self.expanded.insert(Location::Folder(id));
            current = cache.record(id).and_then(|record| record.parent_id);
        }
    }

    /// Depth-first rows for every node reachable through expanded keys.
    pub fn visible_rows(&self, cache: &DirectoryCache, renderer: &dyn LabelRenderer) -> Vec<TreeRow> {
        let root = Self::root(cache);
        let mut rows = Vec::new();
        self.push_rows(root.child_nodes(), 0, renderer, &mut rows);
        rows
    }

    fn push_rows(
        &self,
        nodes: &[TreeNode],
        depth: usize,
        renderer: &dyn LabelRenderer,
        rows: &mut Vec<TreeRow>,
    ) {
        for node in nodes {
            rows.push(TreeRow {
                key: node.key,
                depth,
                label: renderer.label(node),
            });
            if self.is_expanded(node.key) {
                self.push_rows(node.child_nodes(), depth + 1, renderer, rows);
            }
        }
    }
}

fn build_children(
    cache: &DirectoryCache,
    parent: Location,
    visited: &mut HashSet<FolderId>,
) -> Option<Vec<TreeNode>> {
    let records = cache.get_children(parent)?;
    let nodes = records
        .iter()
        .map(|record| {
            let key = Location::Folder(record.id);
            let children = if visited.insert(record.id) {
                build_children(cache, key, visited)
            } else {
                None
            };
            TreeNode {
                key,
                folder: Some(record.clone()),
                loaded: cache.is_loaded(key),
                children,
            }
        })
        .collect();
    Some(nodes)
}

fn filter_nodes(nodes: &[TreeNode], needle: &str, expanded: &mut BTreeSet<Location>) -> Vec<TreeNode> {
    nodes
        .iter()
        .filter_map(|node| {
            let kept_children = filter_nodes(node.child_nodes(), needle, expanded);
            let matches = node.name().to_lowercase().contains(needle);
            if kept_children.is_empty() && !matches {
                return None;
            }
            if !kept_children.is_empty() {
                expanded.insert(node.key);
            }
            // Unloaded nodes stay unloaded; loaded ones keep only surviving children.
            Some(TreeNode {
                children: node.children.as_ref().map(|_| kept_children),
                ..node.clone()
            })
        })
        .collect()
}
