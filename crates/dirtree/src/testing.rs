//! In-memory collaborators for unit tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::{Mutex, RwLock};

use crate::config::SyncConfig;
use crate::provider::{DirectoryEnumerator, DriveType, IconHandle, MetadataResolver, TreeObserver};
use crate::taxonomy;
use crate::tree::{Collaborators, DirectoryTree};

/// A directory-only filesystem held in memory.
#[derive(Debug, Default)]
pub(crate) struct FakeFs {
    dirs: RwLock<BTreeSet<String>>,
    labels: RwLock<FnvHashMap<String, String>>,
    icons: RwLock<FnvHashMap<String, IconHandle>>,
    drive_types: RwLock<FnvHashMap<String, DriveType>>,
    unready: RwLock<FnvHashSet<String>>,
    enumerations: AtomicUsize,
}

impl FakeFs {
    pub(crate) fn with_dirs(paths: &[&str]) -> Arc<Self> {
        let fs = Self::default();
        for path in paths {
            fs.add_dir(path);
        }
        Arc::new(fs)
    }

    /// Adds `path` together with every missing ancestor.
    pub(crate) fn add_dir(&self, path: &str) {
        let mut dirs = self.dirs.write();
        for ancestor in taxonomy::ancestor_chain(path) {
            dirs.insert(ancestor);
        }
    }

    /// Removes `path` and everything below it.
    pub(crate) fn remove_dir(&self, path: &str) {
        self.dirs
            .write()
            .retain(|dir| !taxonomy::is_same_or_descendant(path, dir, false));
    }

    pub(crate) fn rename_dir(&self, old_path: &str, new_path: &str) {
        let mut dirs = self.dirs.write();
        let moved: Vec<String> = dirs
            .iter()
            .filter_map(|dir| taxonomy::rebase(dir, old_path, new_path))
            .collect();
        dirs.retain(|dir| !taxonomy::is_same_or_descendant(old_path, dir, false));
        dirs.extend(moved);
    }

    pub(crate) fn set_label(&self, path: &str, label: &str) {
        self.labels
            .write()
            .insert(path.to_string(), label.to_string());
    }

    pub(crate) fn set_icon(&self, path: &str, icon: IconHandle) {
        self.icons.write().insert(path.to_string(), icon);
    }

    pub(crate) fn set_drive_type(&self, path: &str, drive_type: DriveType) {
        self.drive_types
            .write()
            .insert(path.to_string(), drive_type);
    }

    pub(crate) fn set_ready(&self, path: &str, ready: bool) {
        let mut unready = self.unready.write();
        if ready {
            unready.remove(path);
        } else {
            unready.insert(path.to_string());
        }
    }

    pub(crate) fn enumeration_count(&self) -> usize {
        self.enumerations.load(Ordering::Relaxed)
    }
}

impl DirectoryEnumerator for FakeFs {
    fn enumerate_subdirectories(&self, path: &str) -> Vec<String> {
        self.enumerations.fetch_add(1, Ordering::Relaxed);
        if self.unready.read().contains(path) {
            return Vec::new();
        }
        self.dirs
            .read()
            .iter()
            .filter(|dir| taxonomy::parent_of(dir).as_deref() == Some(path))
            .cloned()
            .collect()
    }

    fn is_directory(&self, path: &str) -> bool {
        self.dirs.read().contains(path)
    }
}

impl MetadataResolver for FakeFs {
    fn display_name(&self, path: &str) -> String {
        self.labels
            .read()
            .get(path)
            .cloned()
            .unwrap_or_else(|| taxonomy::file_name(path).to_string())
    }

    fn icon(&self, path: &str) -> IconHandle {
        if let Some(icon) = self.icons.read().get(path) {
            return *icon;
        }
        if taxonomy::is_drive_root(path) {
            IconHandle::DRIVE
        } else {
            IconHandle::FOLDER
        }
    }

    fn drive_ready(&self, path: &str) -> bool {
        !self.unready.read().contains(path)
    }

    fn drive_type(&self, path: &str) -> DriveType {
        self.drive_types
            .read()
            .get(path)
            .copied()
            .unwrap_or(DriveType::Fixed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notification {
    CurrentDirectory(String),
    Created(String),
    Deleted(String),
    Renamed(String, String),
}

/// Observer that records every notification in order.
#[derive(Debug, Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<Notification>>,
}

impl RecordingObserver {
    pub(crate) fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.events.lock())
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Notification::Deleted(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }
}

impl TreeObserver for RecordingObserver {
    fn current_directory_changed(&self, path: &str) {
        self.events
            .lock()
            .push(Notification::CurrentDirectory(path.to_string()));
    }

    fn item_created(&self, path: &str) {
        self.events
            .lock()
            .push(Notification::Created(path.to_string()));
    }

    fn item_deleted(&self, path: &str) {
        self.events
            .lock()
            .push(Notification::Deleted(path.to_string()));
    }

    fn item_renamed(&self, old_path: &str, new_path: &str) {
        self.events.lock().push(Notification::Renamed(
            old_path.to_string(),
            new_path.to_string(),
        ));
    }
}

/// Builds a tree over `fs` with a recording observer.
pub(crate) fn tree_with(
    fs: &Arc<FakeFs>,
    special_folders: &[&str],
) -> (DirectoryTree, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let collaborators = Collaborators {
        enumerator: fs.clone(),
        resolver: fs.clone(),
        observer: observer.clone(),
    };
    let config = SyncConfig::default().with_case_insensitive_paths(true);
    let tree = DirectoryTree::new(&config, special_folders.iter().copied(), collaborators);
    (tree, observer)
}

/// Returns the node for `path` reached through materialized children.
pub(crate) fn node_at(tree: &DirectoryTree, path: &str) -> crate::arena::NodeId {
    tree.materialized_nodes(&crate::taxonomy::normalize(path))
        .first()
        .copied()
        .unwrap_or_else(|| panic!("no node for {path}"))
}
