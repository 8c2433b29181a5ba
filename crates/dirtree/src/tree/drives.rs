//! Drive roots and the shared drive table.
//!
//! The table is the one piece of tree state readable off the owner thread:
//! media pollers read the last known label and icon from it, and hosts can
//! list mounted roots without marshalling. Root insertion and removal happen
//! while holding its write lock, so readers see a root either fully present
//! or fully absent.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};

use super::{search_sorted, DirectoryTree};
use crate::arena::NodeId;
use crate::error::{Result, TreeError};
use crate::node::{NodeFlags, NodeKind};
use crate::provider::{DriveType, IconHandle};
use crate::taxonomy;

/// Snapshot of one mounted drive root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveEntry {
    pub path: String,
    pub node: NodeId,
    pub drive_type: DriveType,
    pub display_name: String,
    pub icon: IconHandle,
    pub is_ready: bool,
}

/// Shared, lock-guarded list of drive roots sorted by path.
#[derive(Debug, Clone, Default)]
pub struct DriveTable {
    inner: Arc<RwLock<Vec<DriveEntry>>>,
}

impl DriveTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, path: &str) -> Option<DriveEntry> {
        self.inner
            .read()
            .iter()
            .find(|entry| entry.path == path)
            .cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.inner.read().iter().any(|entry| entry.path == path)
    }

    pub fn snapshot(&self) -> Vec<DriveEntry> {
        self.inner.read().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.inner
            .read()
            .iter()
            .map(|entry| entry.path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<DriveEntry>> {
        self.inner.write()
    }
}

impl DirectoryTree {
    /// Node of the mounted drive root at `path`, if any.
    pub fn drive_root(&self, path: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|&id| self.nodes.get(id).is_some_and(|node| node.full_path == path))
    }

    /// Mounts a drive root, inserting it at its sorted position.
    ///
    /// Returns the existing node when the root is already mounted.
    pub fn insert_drive_root(&mut self, path: &str) -> Result<NodeId> {
        let path = taxonomy::normalize(path);
        if !taxonomy::is_drive_root(&path) {
            return Err(TreeError::InvalidPath(path));
        }

        let table = self.drives.clone();
        let mut entries = table.write();
        if let Some(existing) = entries.iter().find(|entry| entry.path == path) {
            return Ok(existing.node);
        }

        let id = self.create_node(path.clone(), NodeKind::DriveRoot);
        let position = match search_sorted(&self.nodes, &self.roots, &path) {
            Ok(position) | Err(position) => position,
        };
        self.roots.insert(position, id);

        let entry = self.drive_entry(id)?;
        let slot = entries
            .binary_search_by(|probe| taxonomy::compare_paths(&probe.path, &path))
            .unwrap_or_else(|slot| slot);
        log::info!(
            "drive root inserted path={} type={:?} ready={}",
            entry.path,
            entry.drive_type,
            entry.is_ready
        );
        entries.insert(slot, entry);
        Ok(id)
    }

    /// Unmounts a drive root and its whole subtree.
    pub fn remove_drive_root(&mut self, path: &str) -> Result<bool> {
        let path = taxonomy::normalize(path);
        let table = self.drives.clone();
        let mut entries = table.write();
        let Some(slot) = entries.iter().position(|entry| entry.path == path) else {
            return Ok(false);
        };

        let entry = entries.remove(slot);
        let removed = self.remove_subtree(entry.node)?;
        self.expansion.forget_subtree(&path);
        log::info!("drive root removed path={} nodes={}", path, removed);
        Ok(true)
    }

    /// Re-reads a drive root's metadata after its media changed.
    ///
    /// A root that is no longer ready loses its children. A ready root is
    /// reset to un-kicked so its new content is enumerated on demand.
    pub fn refresh_drive_root(&mut self, path: &str) -> Result<bool> {
        let path = taxonomy::normalize(path);
        let table = self.drives.clone();
        let mut entries = table.write();
        let Some(slot) = entries.iter().position(|entry| entry.path == path) else {
            return Ok(false);
        };
        let id = entries[slot].node;

        let metadata = self.resolver.metadata(&path, NodeKind::DriveRoot);
        let ready = metadata.is_ready;
        self.node_mut(id)?.apply_metadata(metadata);
        self.drop_children(id)?;

        let has_children = ready && self.enumerator.has_subdirectories(&path);
        let expanded = {
            let node = self.node_mut(id)?;
            node.flags.remove(NodeFlags::KICKED);
            node.flags.set(NodeFlags::HAS_CHILDREN, has_children);
            if !ready {
                node.flags.remove(NodeFlags::EXPANDED);
            }
            node.is_expanded()
        };
        if expanded && has_children {
            self.kick_child(id, false)?;
        }

        entries[slot] = self.drive_entry(id)?;
        log::info!(
            "drive root refreshed path={} ready={} has_children={}",
            path,
            ready,
            has_children
        );
        Ok(true)
    }

    fn drive_entry(&self, id: NodeId) -> Result<DriveEntry> {
        let node = self.get(id)?;
        Ok(DriveEntry {
            path: node.full_path.clone(),
            node: id,
            drive_type: node.drive_type.unwrap_or(DriveType::Fixed),
            display_name: node.display_name.clone(),
            icon: node.icon,
            is_ready: node.is_ready(),
        })
    }
}
