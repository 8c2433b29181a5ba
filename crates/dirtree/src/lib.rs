//! Live directory-tree synchronization engine.
//!
//! This crate keeps an in-memory mirror of the visible part of a filesystem
//! consistent with unordered change notifications:
//! - Arena-backed directory forest with lazy child materialization
//! - Expansion and tri-state check registries with replay after rebuild
//! - Reconciliation of change, create, rename and media events
//! - notify-based watch source, media polling and owner-thread marshalling

pub mod arena;
pub mod checks;
pub mod config;
pub mod error;
pub mod expansion;
pub mod locator;
pub mod marshal;
pub mod media;
pub mod node;
pub mod provider;
pub mod reconciler;
pub mod service;
pub mod taxonomy;
pub mod tree;
pub mod watch;

#[cfg(test)]
mod testing;

// Re-export main types
pub use arena::NodeId;
pub use checks::CheckStateRegistry;
pub use config::{PollConfig, SyncConfig};
pub use error::{Result, TreeError};
pub use expansion::ExpansionRegistry;
pub use locator::TreeLocator;
pub use marshal::{channel, ChannelMarshaller, UiDispatcher, UiJob, UiMarshaller};
pub use media::{MediaChange, MediaPoller, PollOutcome};
pub use node::{CheckState, NodeFlags, NodeKind, TreeNode};
pub use provider::{
    DirectoryEnumerator, DriveType, FsDirectoryEnumerator, FsMetadataResolver, IconHandle,
    MetadataResolver, NoopObserver, TreeObserver,
};
pub use reconciler::{ChangeReconciler, ReconcileOutcome};
pub use service::{Dispatch, EventPump};
pub use taxonomy::PathTaxonomy;
pub use tree::{Collaborators, DirectoryTree, DriveEntry, DriveTable};
pub use watch::{CurrentDirectoryWatcher, EventTranslator, WatchEvent, WatchSource};
