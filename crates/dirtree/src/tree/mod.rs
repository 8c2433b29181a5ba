//! The directory forest.
//!
//! `DirectoryTree` owns every node in a slab arena. Drive roots and
//! special-folder roots are parentless nodes kept in two sorted lists;
//! children are kept sorted by full path inside each node. The tree is owned
//! by a single thread; other threads reach it only through the marshaller.

mod drives;
mod propagate;
mod replay;

use std::cmp::Ordering;
use std::sync::Arc;

use rayon::prelude::*;

pub use drives::{DriveEntry, DriveTable};

use crate::arena::{NodeId, Slab};
use crate::checks::CheckStateRegistry;
use crate::config::SyncConfig;
use crate::error::{Result, TreeError};
use crate::expansion::ExpansionRegistry;
use crate::locator::TreeLocator;
use crate::node::{CheckState, NodeFlags, NodeKind, NodeMetadata, TreeNode};
use crate::provider::{
    DirectoryEnumerator, FsDirectoryEnumerator, FsMetadataResolver, MetadataResolver,
    NoopObserver, TreeObserver,
};
use crate::taxonomy::{self, PathTaxonomy};

/// External collaborators the tree calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub enumerator: Arc<dyn DirectoryEnumerator>,
    pub resolver: Arc<dyn MetadataResolver>,
    pub observer: Arc<dyn TreeObserver>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            enumerator: Arc::new(FsDirectoryEnumerator),
            resolver: Arc::new(FsMetadataResolver),
            observer: Arc::new(NoopObserver),
        }
    }
}

impl Collaborators {
    pub fn with_observer(mut self, observer: Arc<dyn TreeObserver>) -> Self {
        self.observer = observer;
        self
    }
}

pub struct DirectoryTree {
    nodes: Slab<TreeNode>,
    /// Drive roots sorted by path.
    roots: Vec<NodeId>,
    /// Special-folder roots sorted by path.
    special_roots: Vec<NodeId>,
    selected: Option<NodeId>,
    drives: DriveTable,
    expansion: ExpansionRegistry,
    checks: CheckStateRegistry,
    taxonomy: PathTaxonomy,
    enumerator: Arc<dyn DirectoryEnumerator>,
    resolver: Arc<dyn MetadataResolver>,
    observer: Arc<dyn TreeObserver>,
}

impl std::fmt::Debug for DirectoryTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryTree")
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots)
            .field("special_roots", &self.special_roots)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

/// Binary-searches `ids` (sorted by full path) for `path`.
pub(crate) fn search_sorted(
    nodes: &Slab<TreeNode>,
    ids: &[NodeId],
    path: &str,
) -> std::result::Result<usize, usize> {
    ids.binary_search_by(|&id| match nodes.get(id) {
        Some(node) => taxonomy::compare_paths(&node.full_path, path),
        None => Ordering::Less,
    })
}

impl DirectoryTree {
    /// Creates an empty tree. `special_folders` are the known-folder roots
    /// mirrored alongside the drives; they are fixed for the tree's lifetime.
    pub fn new<I, S>(config: &SyncConfig, special_folders: I, collaborators: Collaborators) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            nodes: Slab::new(),
            roots: Vec::new(),
            special_roots: Vec::new(),
            selected: None,
            drives: DriveTable::new(),
            expansion: ExpansionRegistry::from_config(special_folders, config),
            checks: CheckStateRegistry::new(),
            taxonomy: PathTaxonomy::from_config(config),
            enumerator: collaborators.enumerator,
            resolver: collaborators.resolver,
            observer: collaborators.observer,
        }
    }

    /// Seeds the check registry, e.g. with state restored by the host.
    pub fn with_checks(mut self, checks: CheckStateRegistry) -> Self {
        self.checks = checks;
        self
    }

    /// Creates the drive roots and the special-folder roots.
    pub fn initialize<S: AsRef<str>>(&mut self, drives: &[S]) -> Result<()> {
        for drive in drives {
            self.insert_drive_root(drive.as_ref())?;
        }

        let special: Vec<String> = self.expansion.special_roots().to_vec();
        for path in special {
            if search_sorted(&self.nodes, &self.special_roots, &path).is_ok() {
                continue;
            }
            let id = self.create_node(path.clone(), NodeKind::SpecialRoot);
            let position = search_sorted(&self.nodes, &self.special_roots, &path)
                .unwrap_or_else(|position| position);
            self.special_roots.insert(position, id);
        }

        log::info!(
            "tree initialized drives={} special_roots={}",
            self.roots.len(),
            self.special_roots.len()
        );
        Ok(())
    }

    /// Drops every node and expansion entry. The check registry survives.
    pub fn clear(&mut self) {
        self.drives.write().clear();
        self.nodes.clear();
        self.roots.clear();
        self.special_roots.clear();
        self.selected = None;
        self.expansion.clear_expanded();
    }

    /// Clears the forest, re-creates the roots and replays the check registry.
    ///
    /// Returns the number of nodes whose checkbox was restored.
    pub fn rebuild<S: AsRef<str>>(&mut self, drives: &[S]) -> Result<usize> {
        self.clear();
        self.initialize(drives)?;
        let restored = self.replay_onto_tree()?;
        log::info!(
            "tree rebuilt drives={} nodes={} restored={}",
            self.roots.len(),
            self.nodes.len(),
            restored
        );
        Ok(restored)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Like `node`, but a removed handle is an error.
    pub fn get(&self, id: NodeId) -> Result<&TreeNode> {
        self.nodes.get(id).ok_or(TreeError::StaleNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut TreeNode> {
        self.nodes.get_mut(id).ok_or(TreeError::StaleNode(id))
    }

    #[inline]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    #[inline]
    pub fn special_roots(&self) -> &[NodeId] {
        &self.special_roots
    }

    #[inline]
    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    #[inline]
    pub fn drives(&self) -> &DriveTable {
        &self.drives
    }

    #[inline]
    pub fn expansion(&self) -> &ExpansionRegistry {
        &self.expansion
    }

    #[inline]
    pub fn checks(&self) -> &CheckStateRegistry {
        &self.checks
    }

    #[inline]
    pub fn taxonomy(&self) -> &PathTaxonomy {
        &self.taxonomy
    }

    pub fn enumerator(&self) -> &Arc<dyn DirectoryEnumerator> {
        &self.enumerator
    }

    pub fn resolver(&self) -> &Arc<dyn MetadataResolver> {
        &self.resolver
    }

    pub fn observer(&self) -> &Arc<dyn TreeObserver> {
        &self.observer
    }

    pub fn locator(&self) -> TreeLocator<'_> {
        TreeLocator::new(self)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates every live node.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TreeNode)> {
        self.nodes.iter()
    }

    /// The child of `parent` whose full path is exactly `path`.
    pub fn find_child(&self, parent: NodeId, path: &str) -> Result<Option<NodeId>> {
        let node = self.get(parent)?;
        Ok(search_sorted(&self.nodes, &node.children, path)
            .ok()
            .map(|position| node.children[position]))
    }

    /// Resolves metadata and creates a detached node.
    pub(crate) fn create_node(&mut self, path: String, kind: NodeKind) -> NodeId {
        let metadata = self.resolver.metadata(&path, kind);
        let has_children = metadata.is_ready && self.enumerator.has_subdirectories(&path);
        let checked = self.checks.status_of(&path);
        self.insert_node(path, kind, metadata, has_children, checked)
    }

    fn insert_node(
        &mut self,
        path: String,
        kind: NodeKind,
        metadata: NodeMetadata,
        has_children: bool,
        checked: CheckState,
    ) -> NodeId {
        let mut node = TreeNode::new(path, kind, metadata, has_children);
        node.checked = checked;
        self.nodes.insert(node)
    }

    /// Checkbox value inherited by a child materialized below `parent`.
    fn inherited_state(&self, parent: NodeId, path: &str) -> CheckState {
        match self.nodes.get(parent).map(TreeNode::checked) {
            Some(CheckState::Checked) => CheckState::Checked,
            _ => self.checks.status_of(path),
        }
    }

    /// Links a detached node below `parent` at its sorted position.
    fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let path = self.get(child)?.full_path.clone();
        let position = match search_sorted(&self.nodes, &self.get(parent)?.children, &path) {
            Ok(_) => return Err(TreeError::DuplicatePath(path)),
            Err(position) => position,
        };
        self.node_mut(child)?.parent = Some(parent);
        let node = self.node_mut(parent)?;
        node.children.insert(position, child);
        node.flags.insert(NodeFlags::HAS_CHILDREN);
        Ok(())
    }

    /// Unlinks `id` from its parent or from the root lists.
    fn detach(&mut self, id: NodeId) -> Result<()> {
        match self.get(id)?.parent {
            Some(parent) => {
                let node = self.node_mut(parent)?;
                node.children.retain(|child| *child != id);
            }
            None => {
                self.roots.retain(|root| *root != id);
                self.special_roots.retain(|root| *root != id);
            }
        }
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Creates a directory node for `path` below a materialized `parent`.
    ///
    /// Returns `None` when `parent` already holds a child with that path.
    pub fn add_child(&mut self, parent: NodeId, path: &str) -> Result<Option<NodeId>> {
        if self.find_child(parent, path)?.is_some() {
            return Ok(None);
        }
        let metadata = self.resolver.metadata(path, NodeKind::Directory);
        let has_children = self.enumerator.has_subdirectories(path);
        let checked = self.inherited_state(parent, path);
        let id = self.insert_node(
            path.to_string(),
            NodeKind::Directory,
            metadata,
            has_children,
            checked,
        );
        self.attach(parent, id)?;
        if self.get(parent)?.is_expanded() {
            self.expansion.add_directory(path);
        }
        Ok(Some(id))
    }

    /// Removes `id` and every descendant. Returns the number of nodes freed.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<usize> {
        self.detach(id)?;
        Ok(self.free_subtree(id))
    }

    fn free_subtree(&mut self, id: NodeId) -> usize {
        let mut stack = vec![id];
        let mut freed = 0;
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.try_remove(current) else {
                continue;
            };
            if self.selected == Some(current) {
                self.selected = None;
            }
            stack.extend(node.children.iter().copied());
            freed += 1;
        }
        freed
    }

    /// Frees every child of `id` and forgets their expansion entries.
    pub(crate) fn drop_children(&mut self, id: NodeId) -> Result<usize> {
        let children = std::mem::take(&mut self.node_mut(id)?.children);
        let mut freed = 0;
        for child in children {
            if let Some(node) = self.nodes.get(child) {
                self.expansion.forget_subtree(&node.full_path);
            }
            freed += self.free_subtree(child);
        }
        Ok(freed)
    }

    /// Renames `id` and rebases both registries onto the new path.
    pub fn rename_node(&mut self, id: NodeId, new_path: &str) -> Result<()> {
        let old_path = self.get(id)?.full_path.clone();
        self.set_full_path(id, new_path)?;
        let new_path = self.get(id)?.full_path.clone();
        self.checks.rename_prefix(&old_path, &new_path);
        self.expansion.rebase(&old_path, &new_path);
        Ok(())
    }

    /// Carries check state over to a directory's new location after a move
    /// between parents. Expansion state does not follow.
    pub(crate) fn move_registries(&mut self, old_path: &str, new_path: &str) {
        self.checks.rename_prefix(old_path, new_path);
        self.expansion.forget_subtree(old_path);
    }

    /// Forgets registry state at or below `path` after it was deleted.
    pub(crate) fn forget_path(&mut self, path: &str) {
        self.checks.forget_subtree(path);
        self.expansion.forget_subtree(path);
    }

    /// Assigns a new identity to `id`.
    ///
    /// Display metadata is re-resolved and materialized descendants follow
    /// the new prefix. The node moves to its new sorted position among its
    /// siblings; children keep their order.
    pub fn set_full_path(&mut self, id: NodeId, new_path: &str) -> Result<()> {
        let new_path = taxonomy::normalize(new_path);
        let node = self.get(id)?;
        let old_path = node.full_path.clone();
        if old_path == new_path {
            return Ok(());
        }
        let kind = node.kind;
        let siblings = match (node.parent, kind) {
            (Some(parent), _) => &self.get(parent)?.children[..],
            (None, NodeKind::SpecialRoot) => &self.special_roots[..],
            (None, _) => &self.roots[..],
        };
        if search_sorted(&self.nodes, siblings, &new_path).is_ok() {
            return Err(TreeError::DuplicatePath(new_path));
        }

        let mut stack: Vec<NodeId> = node.children.to_vec();
        while let Some(current) = stack.pop() {
            let descendant = self.node_mut(current)?;
            if let Some(rebased) = taxonomy::rebase(&descendant.full_path, &old_path, &new_path) {
                descendant.full_path = rebased;
            }
            stack.extend(descendant.children.iter().copied());
        }

        let metadata = self.resolver.metadata(&new_path, kind);
        let node = self.node_mut(id)?;
        node.full_path = new_path.clone();
        node.apply_metadata(metadata);
        let parent = node.parent;

        match parent {
            Some(parent) => {
                self.node_mut(parent)?.children.retain(|child| *child != id);
                self.node_mut(id)?.parent = None;
                self.attach(parent, id)?;
            }
            None => {
                let list = match kind {
                    NodeKind::SpecialRoot => &mut self.special_roots,
                    _ => &mut self.roots,
                };
                list.retain(|root| *root != id);
                let position =
                    search_sorted(&self.nodes, list, &new_path).unwrap_or_else(|position| position);
                list.insert(position, id);
            }
        }
        log::debug!("node renamed old={} new={}", old_path, new_path);
        Ok(())
    }

    /// Updates whether `id` has subdirectories.
    ///
    /// Clearing the flag frees any materialized children. Setting it on a
    /// node without children marks the node as not yet enumerated, so the
    /// expand affordance shows and the next expansion enumerates for real.
    pub fn set_has_children(&mut self, id: NodeId, has_children: bool) -> Result<()> {
        if !has_children {
            self.drop_children(id)?;
            self.node_mut(id)?.flags.remove(NodeFlags::HAS_CHILDREN);
            return Ok(());
        }
        let node = self.node_mut(id)?;
        node.flags.insert(NodeFlags::HAS_CHILDREN);
        if node.children.is_empty() {
            node.flags.remove(NodeFlags::KICKED);
        }
        Ok(())
    }

    /// Materializes the real children of `id` from the enumerator.
    ///
    /// No-op when already kicked unless `force`. Access failures surface as
    /// an empty child set. Returns the number of children created.
    pub fn kick_child(&mut self, id: NodeId, force: bool) -> Result<usize> {
        let node = self.get(id)?;
        if node.is_kicked() && !force {
            return Ok(0);
        }
        let path = node.full_path.clone();

        let mut paths = self.enumerator.enumerate_subdirectories(&path);
        paths.sort_unstable_by(|a, b| taxonomy::compare_paths(a, b));
        paths.dedup();

        let enumerator = &self.enumerator;
        let resolver = &self.resolver;
        let resolved: Vec<(String, NodeMetadata, bool)> = paths
            .into_par_iter()
            .map(|child| {
                let metadata = resolver.metadata(&child, NodeKind::Directory);
                let has_children = enumerator.has_subdirectories(&child);
                (child, metadata, has_children)
            })
            .collect();

        self.drop_children(id)?;
        let mut created = Vec::with_capacity(resolved.len());
        for (child_path, metadata, has_children) in resolved {
            let checked = self.inherited_state(id, &child_path);
            let child = self.insert_node(
                child_path,
                NodeKind::Directory,
                metadata,
                has_children,
                checked,
            );
            self.node_mut(child)?.parent = Some(id);
            created.push(child);
        }

        let count = created.len();
        let node = self.node_mut(id)?;
        node.children = created.into_iter().collect();
        node.flags.insert(NodeFlags::KICKED);
        node.flags.set(NodeFlags::HAS_CHILDREN, count > 0);
        if node.is_expanded() {
            self.register_children(id)?;
        }

        log::debug!("kicked path={} children={}", path, count);
        Ok(count)
    }

    fn register_children(&mut self, id: NodeId) -> Result<()> {
        let paths: Vec<String> = self
            .get(id)?
            .children
            .iter()
            .filter_map(|&child| self.nodes.get(child).map(|n| n.full_path.clone()))
            .collect();
        for path in paths {
            self.expansion.add_directory(&path);
        }
        Ok(())
    }

    fn deregister_children(&mut self, id: NodeId) -> Result<()> {
        let paths: Vec<String> = self
            .get(id)?
            .children
            .iter()
            .filter_map(|&child| self.nodes.get(child).map(|n| n.full_path.clone()))
            .collect();
        for path in paths {
            self.expansion.remove_directory(&path);
        }
        Ok(())
    }

    /// Expands or collapses `id`.
    ///
    /// Expanding enumerates children on first use (only when the node is
    /// ready) and registers them as visible; collapsing deregisters them.
    pub fn set_is_expanded(&mut self, id: NodeId, expanded: bool) -> Result<()> {
        let node = self.get(id)?;
        if !node.has_children() {
            self.drop_children(id)?;
            self.node_mut(id)?.flags.remove(NodeFlags::EXPANDED);
            return Ok(());
        }

        if expanded {
            if !node.is_kicked() && node.is_ready() {
                self.kick_child(id, false)?;
            }
            self.node_mut(id)?.flags.insert(NodeFlags::EXPANDED);
            self.register_children(id)?;
        } else {
            self.node_mut(id)?.flags.remove(NodeFlags::EXPANDED);
            self.deregister_children(id)?;
        }
        Ok(())
    }

    /// Selects or deselects `id`. At most one node is selected at a time.
    pub fn set_is_selected(&mut self, id: NodeId, selected: bool) -> Result<()> {
        if !selected {
            self.node_mut(id)?.flags.remove(NodeFlags::SELECTED);
            if self.selected == Some(id) {
                self.selected = None;
            }
            return Ok(());
        }

        if let Some(previous) = self.selected.filter(|previous| *previous != id) {
            if let Some(node) = self.nodes.get_mut(previous) {
                node.flags.remove(NodeFlags::SELECTED);
            }
        }
        let node = self.node_mut(id)?;
        node.flags.insert(NodeFlags::SELECTED);
        let path = node.full_path.clone();
        let has_children = node.has_children();
        self.selected = Some(id);

        self.observer.current_directory_changed(&path);
        if has_children {
            self.kick_child(id, false)?;
        }
        Ok(())
    }

    /// Descends from `start` to the node for `path` through enumerated
    /// children. `start` must be `path` itself or one of its ancestors.
    pub(crate) fn descend(&self, start: NodeId, path: &str) -> Option<NodeId> {
        let start_node = self.nodes.get(start)?;
        let start_path = start_node.full_path.as_str();
        if !self.taxonomy.is_under(start_path, path) {
            return None;
        }

        let mut current = start;
        let rest = path.get(start_path.len()..)?;
        for segment in rest.split(['\\', '/']).filter(|s| !s.is_empty()) {
            let node = self.nodes.get(current)?;
            if !node.is_kicked() {
                return None;
            }
            let candidate = taxonomy::join(&node.full_path, segment);
            let position = search_sorted(&self.nodes, &node.children, &candidate).ok()?;
            current = node.children[position];
        }
        Some(current)
    }

    /// Every node for `path` reachable through enumerated children, across
    /// drive roots and special-folder roots.
    pub(crate) fn materialized_nodes(&self, path: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        for &root in self.roots.iter().chain(self.special_roots.iter()) {
            if let Some(id) = self.descend(root, path) {
                if !found.contains(&id) {
                    found.push(id);
                }
            }
        }
        found
    }
}
