//! Tree node data.
//!
//! A `TreeNode` is plain data; every mutation with side effects (kicking,
//! expansion, checkbox propagation) goes through `DirectoryTree`, which owns
//! the arena and the registries.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thin_vec::ThinVec;

use crate::arena::NodeId;
use crate::provider::{DriveType, IconHandle};

/// Tri-state checkbox value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Checked,
    #[default]
    Unchecked,
    Indeterminate,
}

impl CheckState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checked => "checked",
            Self::Unchecked => "unchecked",
            Self::Indeterminate => "indeterminate",
        }
    }
}

impl From<bool> for CheckState {
    fn from(value: bool) -> Self {
        if value {
            Self::Checked
        } else {
            Self::Unchecked
        }
    }
}

impl From<Option<bool>> for CheckState {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Indeterminate, Self::from)
    }
}

bitflags! {
    /// Boolean node attributes packed into a byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        const DIRECTORY    = 1 << 0;
        /// Drive mounted and accessible.
        const READY        = 1 << 1;
        const REMOVABLE    = 1 << 2;
        /// At least one subdirectory exists, materialized or not.
        const HAS_CHILDREN = 1 << 3;
        const EXPANDED     = 1 << 4;
        const SELECTED     = 1 << 5;
        /// Children were enumerated at least once.
        const KICKED       = 1 << 6;
    }
}

/// Where a node sits in the forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A drive root (`C:\`, `/`).
    DriveRoot,
    /// A known-folder shortcut mirrored as an extra root.
    SpecialRoot,
    /// Any directory below a root.
    Directory,
}

/// Metadata resolved for a path by the `MetadataResolver`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeMetadata {
    pub display_name: String,
    pub icon: IconHandle,
    pub is_ready: bool,
    pub drive_type: Option<DriveType>,
}

#[derive(Debug)]
pub struct TreeNode {
    pub(crate) full_path: String,
    pub(crate) display_name: String,
    pub(crate) icon: IconHandle,
    pub(crate) kind: NodeKind,
    pub(crate) drive_type: Option<DriveType>,
    pub(crate) flags: NodeFlags,
    pub(crate) checked: CheckState,
    pub(crate) parent: Option<NodeId>,
    /// Sorted by `full_path` (ordinal).
    pub(crate) children: ThinVec<NodeId>,
}

impl TreeNode {
    pub(crate) fn new(
        full_path: String,
        kind: NodeKind,
        metadata: NodeMetadata,
        has_children: bool,
    ) -> Self {
        let mut flags = NodeFlags::DIRECTORY;
        flags.set(NodeFlags::READY, metadata.is_ready);
        flags.set(NodeFlags::HAS_CHILDREN, has_children);
        flags.set(
            NodeFlags::REMOVABLE,
            matches!(
                metadata.drive_type,
                Some(DriveType::Removable) | Some(DriveType::CdRom)
            ),
        );
        Self {
            full_path,
            display_name: metadata.display_name,
            icon: metadata.icon,
            kind,
            drive_type: metadata.drive_type,
            flags,
            checked: CheckState::Unchecked,
            parent: None,
            children: ThinVec::new(),
        }
    }

    #[inline]
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    #[inline]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[inline]
    pub fn icon(&self) -> IconHandle {
        self.icon
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn drive_type(&self) -> Option<DriveType> {
        self.drive_type
    }

    #[inline]
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[inline]
    pub fn checked(&self) -> CheckState {
        self.checked
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.flags.contains(NodeFlags::DIRECTORY)
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.flags.contains(NodeFlags::READY)
    }

    #[inline]
    pub fn is_removable(&self) -> bool {
        self.flags.contains(NodeFlags::REMOVABLE)
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.flags.contains(NodeFlags::HAS_CHILDREN)
    }

    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.flags.contains(NodeFlags::EXPANDED)
    }

    #[inline]
    pub fn is_selected(&self) -> bool {
        self.flags.contains(NodeFlags::SELECTED)
    }

    #[inline]
    pub fn is_kicked(&self) -> bool {
        self.flags.contains(NodeFlags::KICKED)
    }

    /// True when an expand affordance should be shown although no real child
    /// has been enumerated yet.
    #[inline]
    pub fn has_unmaterialized_children(&self) -> bool {
        self.has_children() && !self.is_kicked()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub(crate) fn apply_metadata(&mut self, metadata: NodeMetadata) {
        self.display_name = metadata.display_name;
        self.icon = metadata.icon;
        if self.kind == NodeKind::DriveRoot {
            self.flags.set(NodeFlags::READY, metadata.is_ready);
        }
        if metadata.drive_type.is_some() {
            self.drive_type = metadata.drive_type;
        }
    }
}
