//! Boundary collaborators.
//!
//! The engine never touches the shell or the filesystem directly; it calls
//! these traits. Hosts plug in platform implementations (shell icons, volume
//! labels), and tests plug in in-memory fakes. The `Fs*` types are std-only
//! defaults good enough for headless use.

use std::fs;
use std::path::Path;

use crate::node::{NodeKind, NodeMetadata};
use crate::taxonomy;

/// Opaque icon handle resolved by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IconHandle(pub u64);

impl IconHandle {
    pub const NONE: Self = Self(0);
    pub const FOLDER: Self = Self(1);
    pub const DRIVE: Self = Self(2);
    pub const OPTICAL: Self = Self(3);
    pub const OPTICAL_EMPTY: Self = Self(4);
}

/// Physical drive classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveType {
    Fixed,
    Removable,
    /// Optical drives need time to mount after media insertion.
    CdRom,
}

impl DriveType {
    #[inline]
    pub fn is_cdrom_like(self) -> bool {
        self == DriveType::CdRom
    }
}

/// Lists subdirectories.
///
/// Implementations swallow access failures and return an empty list: losing
/// access to a directory is routine and must never tear down the tree.
pub trait DirectoryEnumerator: Send + Sync {
    /// Full paths of the immediate subdirectories of `path`.
    fn enumerate_subdirectories(&self, path: &str) -> Vec<String>;

    /// True if `path` has at least one subdirectory.
    fn has_subdirectories(&self, path: &str) -> bool {
        !self.enumerate_subdirectories(path).is_empty()
    }

    /// True if `path` currently exists and is a directory.
    fn is_directory(&self, path: &str) -> bool;
}

/// Resolves presentation metadata and drive properties.
pub trait MetadataResolver: Send + Sync {
    fn display_name(&self, path: &str) -> String;

    fn icon(&self, path: &str) -> IconHandle;

    fn drive_ready(&self, path: &str) -> bool;

    fn drive_type(&self, path: &str) -> DriveType;

    /// Resolves everything a node of `kind` needs.
    fn metadata(&self, path: &str, kind: NodeKind) -> NodeMetadata {
        let (is_ready, drive_type) = match kind {
            NodeKind::DriveRoot => (self.drive_ready(path), Some(self.drive_type(path))),
            NodeKind::SpecialRoot | NodeKind::Directory => (true, None),
        };
        NodeMetadata {
            display_name: self.display_name(path),
            icon: self.icon(path),
            is_ready,
            drive_type,
        }
    }
}

/// Post-hoc notifications for views that mirror the tree.
///
/// Fire-and-forget: no return value, no retry.
pub trait TreeObserver: Send + Sync {
    fn current_directory_changed(&self, _path: &str) {}

    fn item_created(&self, _path: &str) {}

    fn item_deleted(&self, _path: &str) {}

    fn item_renamed(&self, _old_path: &str, _new_path: &str) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TreeObserver for NoopObserver {}

/// `std::fs` backed enumerator.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDirectoryEnumerator;

impl DirectoryEnumerator for FsDirectoryEnumerator {
    fn enumerate_subdirectories(&self, path: &str) -> Vec<String> {
        let read_dir = match fs::read_dir(path) {
            Ok(iter) => iter,
            Err(error) => {
                log::debug!("enumerate skipped path={} error={}", path, error);
                return Vec::new();
            }
        };

        let mut children: Vec<String> = read_dir
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_dir()))
            .map(|entry| taxonomy::join(path, &entry.file_name().to_string_lossy()))
            .collect();
        children.sort_unstable_by(|a, b| taxonomy::compare_paths(a, b));
        children
    }

    fn has_subdirectories(&self, path: &str) -> bool {
        fs::read_dir(path)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .any(|entry| entry.file_type().is_ok_and(|ft| ft.is_dir()))
            })
            .unwrap_or(false)
    }

    fn is_directory(&self, path: &str) -> bool {
        fs::metadata(path).is_ok_and(|m| m.is_dir())
    }
}

/// Headless resolver: names come from the last path segment and every drive
/// reports as fixed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMetadataResolver;

impl MetadataResolver for FsMetadataResolver {
    fn display_name(&self, path: &str) -> String {
        taxonomy::file_name(path).to_string()
    }

    fn icon(&self, path: &str) -> IconHandle {
        if taxonomy::is_drive_root(path) {
            IconHandle::DRIVE
        } else {
            IconHandle::FOLDER
        }
    }

    fn drive_ready(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn drive_type(&self, _path: &str) -> DriveType {
        DriveType::Fixed
    }
}
