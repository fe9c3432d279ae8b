//! Fixed-capacity, generation-checked slot pool
//!
//! A capacity cap over `slotmap`: keys carry the version of the slot they
//! were issued for, so a handle kept past a removal never resolves to
//! whatever reuses the slot.

use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Stable reference to a pool entry
    pub struct Handle;
}

/// Pool of at most `capacity` live values
#[derive(Debug, Clone)]
pub struct Pool<T> {
    slots: SlotMap<Handle, T>,
    capacity: usize,
}

impl<T> Pool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// Insert a value, reusing a freed slot if there is one. Returns `None`
    /// when full.
    pub fn try_add(&mut self, value: T) -> Option<Handle> {
        if self.is_full() {
            return None;
        }
        Some(self.slots.insert(value))
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        self.slots.remove(handle)
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots.get(handle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots.get_mut(handle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.slots.contains_key(handle)
    }

    /// Entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.slots.iter_mut()
    }

    /// Keep only the entries for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(Handle, &mut T) -> bool) {
        self.slots.retain(|handle, value| keep(handle, value));
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
