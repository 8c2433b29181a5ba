//! Node handle type.

use std::fmt;

/// A compact 32-bit handle into the node arena.
///
/// Handles are only meaningful for the arena that issued them, and a handle
/// to a removed node may later be reused for a different node. Long-lived
/// references (polling tasks, queued jobs) address nodes by path instead.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a handle from a slot index.
    ///
    /// # Panics
    /// Panics if `index` does not fit in a `u32`.
    #[inline]
    pub fn new(index: usize) -> Self {
        assert!(
            index < u32::MAX as usize,
            "node index must be less than u32::MAX"
        );
        Self(index as u32)
    }

    /// Returns the slot index.
    #[inline]
    pub fn get(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_roundtrips_index() {
        let id = NodeId::new(42);
        assert_eq!(id.get(), 42);
        assert_eq!(format!("{id:?}"), "NodeId(42)");
    }

    #[test]
    #[should_panic(expected = "node index must be less than u32::MAX")]
    fn node_id_rejects_overflow() {
        let _ = NodeId::new(u32::MAX as usize);
    }
}
