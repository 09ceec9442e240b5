//! # Id Pool
//!
//! Hands out small dense integer ids and recycles freed ones through a
//! free list. Every sparse table in the engine (bodies, shapes, joints,
//! contacts, islands) takes its slot indices from one of these.
//!
//! The pool manages index lifetime only. Stale-handle detection needs a
//! generation counter, which lives in the owning record; see
//! [`HandleTable`](crate::handle::HandleTable).

use super::array::GrowableArray;
use crate::contract::debug_contract;

/// A recycling allocator of `u32` ids.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = IdPool::new();
/// let a = pool.allocate(); // 0
/// let b = pool.allocate(); // 1
/// pool.free(a);
/// let c = pool.allocate(); // 0 again
/// ```
#[derive(Clone, Debug, Default)]
pub struct IdPool {
    /// Freed ids, reused last-in first-out.
    free_array: GrowableArray<u32>,
    /// Next id that has never been issued.
    next_index: u32,
}

impl IdPool {
    /// Creates an empty pool.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            free_array: GrowableArray::new(),
            next_index: 0,
        }
    }

    /// Returns a recycled id if one is available, otherwise a fresh one.
    pub fn allocate(&mut self) -> u32 {
        if let Some(id) = self.free_array.pop() {
            return id;
        }

        let id = self.next_index;
        self.next_index += 1;
        id
    }

    /// Returns `id` to the pool.
    ///
    /// The id must have been issued by this pool and not freed since. Both
    /// are debug-only contracts. An id the pool never issued is ignored in
    /// every build, so it can never come back out of [`allocate`](Self::allocate).
    pub fn free(&mut self, id: u32) {
        debug_contract!(self.next_index > 0, "free of id {id} on an empty id pool");
        debug_contract!(
            id < self.next_index,
            "free of id {id} that was never issued (next is {})",
            self.next_index
        );
        if id >= self.next_index {
            return;
        }
        self.free_array.push(id);
    }

    /// Number of ids currently issued and not freed.
    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        (self.next_index as usize).saturating_sub(self.free_array.len())
    }

    /// Returns `true` if no ids are live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }

    /// One past the highest id ever issued.
    ///
    /// Sparse arrays indexed by these ids must be at least this long.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.next_index
    }

    /// Number of ids waiting in the free list.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_array.len()
    }

    /// Returns `true` if `id` is currently in the free list. O(n).
    #[must_use]
    pub fn is_free(&self, id: u32) -> bool {
        self.free_array.iter().any(|&free| free == id)
    }

    /// Checks, in debug builds, that `id` is in the free list.
    pub fn validate_free_id(&self, id: u32) {
        debug_contract!(
            id < self.next_index && self.is_free(id),
            "id {id} is expected to be free"
        );
    }

    /// Checks, in debug builds, that `id` is issued and not freed.
    pub fn validate_used_id(&self, id: u32) {
        debug_contract!(
            id < self.next_index && !self.is_free(id),
            "id {id} is expected to be in use"
        );
    }

    /// Forgets every id. The next allocation returns 0.
    pub fn reset(&mut self) {
        self.free_array.clear();
        self.next_index = 0;
    }
}
