//! Path to node lookup.
//!
//! Lookups only follow children that were already enumerated: a node whose
//! children were never materialized has no trustworthy child list, so the
//! search stops there instead of forcing an enumeration. Below drive roots
//! the walk also stops at collapsed directories, unless they lie inside a
//! special folder. A miss is the normal answer for events outside the
//! visible part of the tree.

use crate::arena::NodeId;
use crate::error::{Result, TreeError};
use crate::taxonomy;
use crate::tree::DirectoryTree;

/// Read-only view resolving paths against a `DirectoryTree`.
#[derive(Debug, Clone, Copy)]
pub struct TreeLocator<'a> {
    tree: &'a DirectoryTree,
}

impl<'a> TreeLocator<'a> {
    pub fn new(tree: &'a DirectoryTree) -> Self {
        Self { tree }
    }

    /// The node for `path` below its drive root, if visible.
    ///
    /// The first element of the ancestor chain must equal a drive root's path
    /// exactly; every further element must match an enumerated child of an
    /// expanded parent.
    pub fn find_node_for_path(&self, path: &str) -> Option<NodeId> {
        let path = taxonomy::normalize(path);
        let chain = taxonomy::ancestor_chain(&path);
        let (root_path, rest) = chain.split_first()?;
        let root = self.tree.roots().iter().copied().find(|&id| {
            self.tree
                .node(id)
                .is_some_and(|node| node.full_path() == root_path)
        })?;

        let expansion = self.tree.expansion();
        let mut current = root;
        for step in rest {
            let node = self.tree.node(current)?;
            if !node.is_kicked() {
                return None;
            }
            if !node.is_expanded() && !expansion.has_special_sub_folder(node.full_path()) {
                return None;
            }
            current = self.tree.find_child(current, step).ok()??;
        }
        Some(current)
    }

    /// Like `find_node_for_path`, but a miss is an error.
    pub fn resolve(&self, path: &str) -> Result<NodeId> {
        self.find_node_for_path(path)
            .ok_or_else(|| TreeError::NodeNotFound(path.to_string()))
    }

    /// Every node for `path` found under the special-folder roots that
    /// contain it. One directory can be reachable through several mirrors.
    pub fn find_special_roots_containing(&self, path: &str) -> Vec<NodeId> {
        let path = taxonomy::normalize(path);
        let taxonomy = self.tree.taxonomy();
        self.tree
            .special_roots()
            .iter()
            .copied()
            .filter(|&root| {
                self.tree
                    .node(root)
                    .is_some_and(|node| taxonomy.is_under(node.full_path(), &path))
            })
            .filter_map(|root| self.tree.descend(root, &path))
            .collect()
    }

    /// Ordinary match first, then special-folder matches, without duplicates.
    pub fn find_all(&self, path: &str) -> Vec<NodeId> {
        let mut found: Vec<NodeId> = self.find_node_for_path(path).into_iter().collect();
        for id in self.find_special_roots_containing(path) {
            if !found.contains(&id) {
                found.push(id);
            }
        }
        found
    }

    /// The mounted drive root owning `path`.
    pub fn drive_root_for(&self, path: &str) -> Option<NodeId> {
        let root = taxonomy::drive_root_of(path)?;
        self.tree.drive_root(&root)
    }
}
