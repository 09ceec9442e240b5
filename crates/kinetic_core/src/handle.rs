//! # Generational Handles
//!
//! External references to bodies, shapes and joints are handles:
//! - An index into a sparse table, issued by an [`IdPool`]
//! - A 16-bit generation, bumped every time the slot is reused
//!
//! The id pool only tracks which indices are free. Telling a live handle
//! from a stale one is the owning table's job, and [`HandleTable`] is the
//! reference owner that does it.

use crate::memory::{GrowableArray, IdPool};

/// Stable reference into a [`HandleTable`].
///
/// Packed into a `u64` so it can cross the FFI and replay boundaries:
/// - Lower 32 bits: slot index
/// - Bits 32..48: generation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Handle(u64);

impl Handle {
    /// Null/invalid handle.
    pub const NULL: Self = Self::new(u32::MAX, u16::MAX);

    /// Creates a handle from a slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u16) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Generation the slot had when this handle was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u16 {
        (self.0 >> 32) as u16
    }

    /// Checks if this handle is null.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    /// Packed representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Rebuilds a handle from [`to_bits`](Self::to_bits). Bits above 48 are
    /// discarded.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits & 0xFFFF_FFFF_FFFF)
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::NULL
    }
}

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// Sparse table of records addressed by generational handles.
///
/// # Example
///
/// ```rust,ignore
/// let mut bodies: HandleTable<BodySim> = HandleTable::new();
/// let handle = bodies.insert(sim);
/// bodies.remove(handle);
/// assert!(bodies.get(handle).is_none()); // stale
/// ```
pub struct HandleTable<T> {
    ids: IdPool,
    slots: GrowableArray<Slot<T>>,
}

impl<T> HandleTable<T> {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ids: IdPool::new(),
            slots: GrowableArray::new(),
        }
    }

    /// Number of live records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.live_count()
    }

    /// Returns `true` if there are no live records.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Stores `value` and returns its handle.
    pub fn insert(&mut self, value: T) -> Handle {
        let id = self.ids.allocate();
        let index = id as usize;

        if index == self.slots.len() {
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            return Handle::new(id, 0);
        }

        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        slot.value = Some(value);
        Handle::new(id, slot.generation)
    }

    /// Returns the record for `handle`, or `None` if it is stale or null.
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(handle.index() as usize).ok()?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Returns the record for `handle` mutably.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index() as usize).ok()?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Returns `true` if `handle` refers to a live record.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Removes and returns the record for `handle`.
    ///
    /// Returns `None`, and changes nothing, if the handle is stale.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index() as usize).ok()?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        self.ids.free(handle.index());
        Some(value)
    }

    /// Iterates over live records with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(index as u32, slot.generation), value))
        })
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
