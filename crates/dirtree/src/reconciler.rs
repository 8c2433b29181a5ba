//! Applies filesystem and media events to the tree.
//!
//! Event order is not trusted. `Changed` re-derives removals from a live
//! enumeration of the directory; `Created` and `Renamed` are taken at face
//! value because nothing better is available. Every handler runs on the
//! thread that owns the tree.

use std::ops::AddAssign;

use fnv::FnvHashSet;

use crate::arena::NodeId;
use crate::error::{Result, TreeError};
use crate::locator::TreeLocator;
use crate::taxonomy;
use crate::tree::DirectoryTree;
use crate::watch::WatchEvent;

/// Mutation counts produced by one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub removed: usize,
    pub renamed: usize,
    pub refreshed: usize,
}

impl ReconcileOutcome {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for ReconcileOutcome {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
        self.renamed += other.renamed;
        self.refreshed += other.refreshed;
    }
}

#[derive(Debug)]
pub struct ChangeReconciler {
    tree: DirectoryTree,
}

impl ChangeReconciler {
    pub fn new(tree: DirectoryTree) -> Self {
        Self { tree }
    }

    #[inline]
    pub fn tree(&self) -> &DirectoryTree {
        &self.tree
    }

    #[inline]
    pub fn tree_mut(&mut self) -> &mut DirectoryTree {
        &mut self.tree
    }

    pub fn into_tree(self) -> DirectoryTree {
        self.tree
    }

    pub fn locator(&self) -> TreeLocator<'_> {
        self.tree.locator()
    }

    /// Applies one event. Failures are logged and swallowed so that one bad
    /// event never stops the pipeline.
    pub fn handle(&mut self, event: WatchEvent) -> ReconcileOutcome {
        let kind = event.kind();
        match self.try_handle(event) {
            Ok(outcome) => outcome,
            Err(error) => {
                log::warn!("reconcile failed event={} error={}", kind, error);
                ReconcileOutcome::default()
            }
        }
    }

    /// Applies a batch in order and sums the outcomes.
    pub fn handle_all<I>(&mut self, events: I) -> ReconcileOutcome
    where
        I: IntoIterator<Item = WatchEvent>,
    {
        let mut total = ReconcileOutcome::default();
        for event in events {
            total += self.handle(event);
        }
        total
    }

    pub fn try_handle(&mut self, event: WatchEvent) -> Result<ReconcileOutcome> {
        match event {
            WatchEvent::Changed(path) => self.on_changed(&path),
            WatchEvent::Created(path) => self.on_created(&path),
            WatchEvent::Renamed { old_path, new_path } => self.on_renamed(&old_path, &new_path),
            WatchEvent::OpticalMediaInserted(path) => self.on_media_inserted(&path),
            WatchEvent::OpticalMediaEjected(path) => self.on_media_ejected(&path),
        }
    }

    /// Removes cached children that no longer exist under `path`.
    ///
    /// A change inside the recycle bin is redirected to the drive root:
    /// deleting a root-level directory is only observable there.
    pub fn on_changed(&mut self, path: &str) -> Result<ReconcileOutcome> {
        let path = taxonomy::normalize(path);
        let target = if self.tree.taxonomy().is_recycle_bin_path(&path) {
            taxonomy::drive_root_of(&path).ok_or_else(|| TreeError::InvalidPath(path.clone()))?
        } else {
            path
        };

        let matches = self.locator().find_all(&target);
        if matches.is_empty() {
            log::debug!("change ignored path={} reason=not_materialized", target);
            return Ok(ReconcileOutcome::default());
        }
        let enumerator = self.tree.enumerator().clone();
        if !enumerator.is_directory(&target) {
            log::debug!("change ignored path={} reason=not_a_directory", target);
            return Ok(ReconcileOutcome::default());
        }

        let live: FnvHashSet<String> = enumerator
            .enumerate_subdirectories(&target)
            .iter()
            .map(|child| taxonomy::file_name(child).to_string())
            .collect();

        let mut outcome = ReconcileOutcome::default();
        let mut notified = FnvHashSet::default();
        for parent in matches {
            let node = self.tree.get(parent)?;
            if !node.is_kicked() {
                let has_children = !live.is_empty();
                if node.has_children() != has_children {
                    self.tree.set_has_children(parent, has_children)?;
                    outcome.refreshed += 1;
                }
                continue;
            }

            let removed: Vec<(NodeId, String)> = node
                .children()
                .iter()
                .filter_map(|&child| {
                    self.tree
                        .node(child)
                        .map(|n| (child, n.full_path().to_string()))
                })
                .filter(|(_, child_path)| !live.contains(taxonomy::file_name(child_path)))
                .collect();

            for (child, child_path) in removed {
                self.tree.remove_subtree(child)?;
                outcome.removed += 1;
                if notified.insert(child_path.clone()) {
                    self.tree.forget_path(&child_path);
                    self.tree.observer().item_deleted(&child_path);
                }
            }

            let node = self.tree.get(parent)?;
            if node.children().is_empty() && node.has_children() {
                self.tree.set_has_children(parent, false)?;
                outcome.refreshed += 1;
            }
        }

        if outcome.removed > 0 {
            log::debug!(
                "change reconciled path={} removed={}",
                target,
                outcome.removed
            );
        }
        Ok(outcome)
    }

    /// Inserts a node for a new directory under every materialized parent.
    pub fn on_created(&mut self, path: &str) -> Result<ReconcileOutcome> {
        let path = taxonomy::normalize(path);
        if self.tree.taxonomy().is_recycle_bin_path(&path) {
            return Ok(ReconcileOutcome::default());
        }
        let Some(parent_path) = taxonomy::parent_of(&path) else {
            return Ok(ReconcileOutcome::default());
        };

        let parents = self.locator().find_all(&parent_path);
        if parents.is_empty() {
            log::debug!("create ignored path={} reason=parent_not_materialized", path);
            return Ok(ReconcileOutcome::default());
        }

        let mut outcome = ReconcileOutcome::default();
        if self.tree.enumerator().is_directory(&path) {
            for parent in parents {
                let node = self.tree.get(parent)?;
                if !node.is_kicked() {
                    if !node.has_children() {
                        self.tree.set_has_children(parent, true)?;
                        outcome.refreshed += 1;
                    }
                    continue;
                }
                if self.tree.add_child(parent, &path)?.is_some() {
                    outcome.added += 1;
                }
            }
        }

        self.tree.observer().item_created(&path);
        Ok(outcome)
    }

    /// Renames the matching child under every materialized parent.
    ///
    /// A move between directories becomes a removal plus a creation. When no
    /// node for `old_path` is materialized the event is dropped unannounced.
    pub fn on_renamed(&mut self, old_path: &str, new_path: &str) -> Result<ReconcileOutcome> {
        let old_path = taxonomy::normalize(old_path);
        let new_path = taxonomy::normalize(new_path);
        if self.tree.taxonomy().is_recycle_bin_path(&new_path) {
            return Ok(ReconcileOutcome::default());
        }
        let Some(new_parent) = taxonomy::parent_of(&new_path) else {
            return Ok(ReconcileOutcome::default());
        };

        if taxonomy::parent_of(&old_path).as_deref() != Some(new_parent.as_str()) {
            return self.on_moved(&old_path, &new_path);
        }

        let mut outcome = ReconcileOutcome::default();
        for parent in self.locator().find_all(&new_parent) {
            let Some(child) = self.tree.find_child(parent, &old_path)? else {
                continue;
            };
            // the target already has a node: the old one is simply gone
            if self.tree.find_child(parent, &new_path)?.is_some() {
                self.tree.remove_subtree(child)?;
                outcome.removed += 1;
                continue;
            }
            self.tree.rename_node(child, &new_path)?;
            outcome.renamed += 1;
        }

        if outcome.is_empty() {
            log::debug!("rename ignored old={} reason=not_materialized", old_path);
            return Ok(outcome);
        }
        if outcome.removed > 0 {
            self.tree.forget_path(&old_path);
            self.tree.observer().item_deleted(&old_path);
        }
        if outcome.renamed > 0 {
            self.tree.observer().item_renamed(&old_path, &new_path);
        }
        Ok(outcome)
    }

    fn on_moved(&mut self, old_path: &str, new_path: &str) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();
        for node in self.locator().find_all(old_path) {
            self.tree.remove_subtree(node)?;
            outcome.removed += 1;
        }
        // registries first, so the node created below inherits its state
        self.tree.move_registries(old_path, new_path);

        if let Some(new_parent) = taxonomy::parent_of(new_path) {
            if self.tree.enumerator().is_directory(new_path) {
                for parent in self.locator().find_all(&new_parent) {
                    if !self.tree.get(parent)?.is_kicked() {
                        continue;
                    }
                    if self.tree.add_child(parent, new_path)?.is_some() {
                        outcome.added += 1;
                    }
                }
            }
        }

        if outcome.is_empty() {
            log::debug!("move ignored old={} reason=not_materialized", old_path);
            return Ok(outcome);
        }
        log::debug!(
            "move reconciled old={} new={} removed={} added={}",
            old_path,
            new_path,
            outcome.removed,
            outcome.added
        );
        self.tree.observer().item_renamed(old_path, new_path);
        Ok(outcome)
    }

    /// Mounts or refreshes a drive root after media arrived.
    pub fn on_media_inserted(&mut self, path: &str) -> Result<ReconcileOutcome> {
        let root = taxonomy::drive_root_of(path)
            .ok_or_else(|| TreeError::InvalidPath(path.to_string()))?;
        let mut outcome = ReconcileOutcome::default();
        if self.tree.drive_root(&root).is_some() {
            if self.tree.refresh_drive_root(&root)? {
                outcome.refreshed += 1;
            }
        } else {
            self.tree.insert_drive_root(&root)?;
            outcome.added += 1;
        }
        log::info!("media inserted root={}", root);
        Ok(outcome)
    }

    /// Unmounts a removable root, or marks an optical root as empty.
    pub fn on_media_ejected(&mut self, path: &str) -> Result<ReconcileOutcome> {
        let root = taxonomy::drive_root_of(path)
            .ok_or_else(|| TreeError::InvalidPath(path.to_string()))?;
        let drive_type = match self.tree.drives().lookup(&root) {
            Some(entry) => entry.drive_type,
            None => return Ok(ReconcileOutcome::default()),
        };

        let mut outcome = ReconcileOutcome::default();
        if drive_type.is_cdrom_like() {
            if self.tree.refresh_drive_root(&root)? {
                outcome.refreshed += 1;
            }
        } else if self.tree.remove_drive_root(&root)? {
            outcome.removed += 1;
        }
        log::info!("media ejected root={} type={:?}", root, drive_type);
        Ok(outcome)
    }
}
