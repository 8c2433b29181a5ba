//! Slab allocator with an intrusive freelist.
//!
//! Removed slots are threaded into a freelist so inserts reuse them before
//! the backing vector grows. Handles stay stable for the lifetime of the value.

use std::fmt;
use std::ops::{Index, IndexMut};

use super::index::NodeId;

/// Slot state.
#[derive(Clone)]
enum Entry<T> {
    /// Slot is free; stores the index of the next free slot.
    Vacant(usize),
    /// Slot holds a value.
    Occupied(T),
}

pub struct Slab<T> {
    entries: Vec<Entry<T>>,
    /// Logical element count (occupied slots only).
    len: usize,
    /// Head of the freelist; equals `entries.len()` when the list is empty.
    next: usize,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slab<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            len: 0,
            next: 0,
        }
    }

    /// Inserts a value, returning its handle.
    pub fn insert(&mut self, value: T) -> NodeId {
        let key = self.next;
        if key == self.entries.len() {
            self.entries.push(Entry::Occupied(value));
            self.next = self.entries.len();
        } else {
            let next_free = match self.entries[key] {
                Entry::Vacant(next) => next,
                Entry::Occupied(_) => unreachable!("freelist head points at an occupied slot"),
            };
            self.entries[key] = Entry::Occupied(value);
            self.next = next_free;
        }
        self.len += 1;
        NodeId::new(key)
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        match self.entries.get(id.get()) {
            Some(Entry::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        match self.entries.get_mut(id.get()) {
            Some(Entry::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Removes the value behind `id`, returning it if the slot was occupied.
    pub fn try_remove(&mut self, id: NodeId) -> Option<T> {
        let index = id.get();
        let slot = self.entries.get_mut(index)?;
        if matches!(slot, Entry::Vacant(_)) {
            return None;
        }
        let prev = std::mem::replace(slot, Entry::Vacant(self.next));
        self.next = index;
        self.len -= 1;
        match prev {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant(_) => None,
        }
    }

    /// Drops every value and releases the backing storage.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.len = 0;
        self.next = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> SlabIter<'_, T> {
        SlabIter {
            entries: self.entries.iter().enumerate(),
        }
    }
}

impl<T> Index<NodeId> for Slab<T> {
    type Output = T;

    fn index(&self, id: NodeId) -> &Self::Output {
        self.get(id).expect("invalid node handle")
    }
}

impl<T> IndexMut<NodeId> for Slab<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        self.get_mut(id).expect("invalid node handle")
    }
}

impl<T> fmt::Debug for Slab<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("len", &self.len)
            .field("next", &self.next)
            .field("slots", &self.entries.len())
            .finish()
    }
}

/// Iterator over occupied slots.
pub struct SlabIter<'a, T> {
    entries: std::iter::Enumerate<std::slice::Iter<'a, Entry<T>>>,
}

impl<'a, T> Iterator for SlabIter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        for (index, entry) in self.entries.by_ref() {
            if let Entry::Occupied(value) = entry {
                return Some((NodeId::new(index), value));
            }
        }
        None
    }
}

impl<'a, T> IntoIterator for &'a Slab<T> {
    type Item = (NodeId, &'a T);
    type IntoIter = SlabIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
