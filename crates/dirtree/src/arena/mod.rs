//! Arena storage for tree nodes.
//!
//! Nodes live in a slab and refer to each other through compact [`NodeId`]
//! handles. A parent owns its children through its children list; the
//! `parent` handle stored on a child is only used for upward walks.
//!
//! - `index` - Compact handle type (`NodeId`)
//! - `slab` - Freelist slab allocator (`Slab<T>`)

mod index;
mod slab;

pub use index::NodeId;
pub use slab::{Slab, SlabIter};
