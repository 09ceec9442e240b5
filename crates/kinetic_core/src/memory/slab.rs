//! # Arena Slabs
//!
//! One slab per item type. A slab owns a pre-sized run of 32-byte aligned
//! blocks and serves requests from it with a stack pointer; requests that
//! do not fit fall back to a standalone heap block. Every allocation, from
//! either origin, is recorded on the slab's entry stack so frees can be
//! checked for strict LIFO order.
//!
//! ## Safety Note
//!
//! Live [`ArenaItem`]s hand out `&mut [T]` into slab memory while the slab
//! keeps serving other requests, so this module works with raw pointers.
//! The rules that keep it sound:
//!
//! - Slab memory is only ever touched through raw pointers derived from
//!   the block base, never through references to the block buffer.
//! - Stack regions of live entries never overlap: the stack pointer only
//!   advances on allocate and only retreats when its top entry is freed.
//! - The block buffer is only replaced by `grow`, which refuses while any
//!   entry is live.
//! - A region never covers more than its reservation, and reservation sizes
//!   are computed with checked arithmetic.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

use bytemuck::Zeroable;
use parking_lot::Mutex;
use thiserror::Error;

use super::array::GrowableArray;
use super::tracked;
use crate::contract;
use crate::error::{ArenaError, ArenaResult};

/// Alignment in bytes of every region an arena hands out (256-bit SIMD).
pub const ARENA_ALIGNMENT: usize = 32;

/// Unit of slab storage.
#[derive(Clone, Copy, Zeroable)]
#[repr(C, align(32))]
struct Block {
    _bytes: [u8; ARENA_ALIGNMENT],
}

/// An owned, zero-initialized run of blocks.
struct RawBlocks {
    ptr: NonNull<[Block]>,
}

// SAFETY: RawBlocks owns its allocation exclusively, exactly like the
// Box<[Block]> it was created from.
unsafe impl Send for RawBlocks {}

impl RawBlocks {
    fn zeroed(len: usize) -> Self {
        let boxed: Box<[Block]> = tracked::alloc_buffer(len);
        Self {
            ptr: NonNull::from(Box::leak(boxed)),
        }
    }

    /// Pointer to the byte at `offset`.
    ///
    /// # Safety
    ///
    /// `offset` must not exceed the buffer length in bytes.
    unsafe fn byte_ptr(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.ptr.len() * ARENA_ALIGNMENT);
        // SAFETY: caller keeps offset within (or one past) the allocation.
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().cast::<u8>().add(offset)) }
    }
}

impl Drop for RawBlocks {
    fn drop(&mut self) {
        // SAFETY: ptr came from Box::leak in `zeroed` and is reclaimed once.
        let boxed = unsafe { Box::from_raw(self.ptr.as_ptr()) };
        tracked::free_buffer(boxed);
    }
}

/// One live allocation on a slab.
struct ArenaEntry {
    /// Allocation sequence number; identifies the entry on free.
    serial: u64,
    /// Items reserved, after alignment rounding.
    size: usize,
    /// Heap block when the request overflowed the stack (`usedMalloc`).
    heap: Option<RawBlocks>,
    /// Caller-supplied tag for diagnostics.
    name: &'static str,
    /// Dropped out of order; reclaimed once it is the top entry.
    abandoned: bool,
}

struct SlabState {
    blocks: RawBlocks,
    /// Stack capacity in items.
    capacity: usize,
    /// Stack pointer in items.
    index: usize,
    /// Items outstanding from both origins.
    allocation: usize,
    /// High-water mark of `allocation` since the last grow.
    max_allocation: usize,
    entries: GrowableArray<ArenaEntry>,
    next_serial: u64,
    heap_fallbacks: u64,
}

/// Point-in-time view of one slab.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlabStats {
    /// Item type served by the slab.
    pub type_name: &'static str,
    /// Index assigned to the item type by the registry.
    pub registry_index: u32,
    /// Stack capacity in items.
    pub capacity: usize,
    /// Current stack offset in items.
    pub index: usize,
    /// Items currently outstanding, stack and heap.
    pub allocation: usize,
    /// Peak of `allocation` since the slab last grew.
    pub max_allocation: usize,
    /// Number of live allocations.
    pub live_entries: usize,
    /// Requests served from the heap since the slab was created.
    pub heap_fallbacks: u64,
}

/// Type-erased slab operations used when iterating every slab.
pub(crate) trait SlabOps: Send + Sync {
    fn stats(&self) -> SlabStats;
    fn is_idle(&self) -> bool;
    fn grow(&self) -> ArenaResult<bool>;
}

/// Stack-discipline storage for items of type `T`.
pub(crate) struct ArenaSlab<T> {
    registry_index: u32,
    state: Mutex<SlabState>,
    _item: PhantomData<fn() -> T>,
}

/// What [`ArenaSlab::allocate`] hands to the item guard.
struct Reservation<T> {
    ptr: NonNull<T>,
    reserved: usize,
    serial: u64,
    used_malloc: bool,
}

impl<T: Zeroable + Copy + 'static> ArenaSlab<T> {
    pub(crate) fn new(registry_index: u32, capacity: usize) -> Self {
        if std::mem::size_of::<T>() == 0 || std::mem::align_of::<T>() > ARENA_ALIGNMENT {
            contract::fatal(format_args!(
                "arena item type `{}` must be sized and aligned to at most {ARENA_ALIGNMENT} bytes",
                std::any::type_name::<T>()
            ));
        }

        Self {
            registry_index,
            state: Mutex::new(SlabState {
                blocks: RawBlocks::zeroed(Self::blocks_for(capacity)),
                capacity,
                index: 0,
                allocation: 0,
                max_allocation: 0,
                entries: GrowableArray::new(),
                next_serial: 0,
                heap_fallbacks: 0,
            }),
            _item: PhantomData,
        }
    }

    /// Smallest item count whose byte size is a multiple of the alignment.
    const fn granule() -> usize {
        let size = std::mem::size_of::<T>();
        let (mut a, mut b) = (size, ARENA_ALIGNMENT);
        while b != 0 {
            let t = a % b;
            a = b;
            b = t;
        }
        ARENA_ALIGNMENT / a
    }

    /// Rounds an item count up so the region ends on an aligned boundary.
    ///
    /// A count whose rounded region is not addressable is fatal.
    pub(crate) fn round_len(len: usize) -> usize {
        len.checked_next_multiple_of(Self::granule())
            .filter(|&size| Self::byte_len(size).is_some())
            .unwrap_or_else(|| Self::capacity_overflow(len))
    }

    /// Byte size of `items`, or `None` past `isize::MAX` like `Vec`.
    fn byte_len(items: usize) -> Option<usize> {
        items
            .checked_mul(std::mem::size_of::<T>())
            .filter(|&bytes| isize::try_from(bytes).is_ok())
    }

    fn blocks_for(items: usize) -> usize {
        match Self::byte_len(items) {
            Some(bytes) => bytes.div_ceil(ARENA_ALIGNMENT),
            None => Self::capacity_overflow(items),
        }
    }

    #[track_caller]
    fn capacity_overflow(items: usize) -> ! {
        contract::fatal(format_args!(
            "capacity overflow: {items} items of `{}` exceed the addressable size",
            std::any::type_name::<T>()
        ))
    }

    fn allocate(&self, len: usize, name: &'static str) -> Reservation<T> {
        let size = Self::round_len(len);
        let item_size = std::mem::size_of::<T>();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let (ptr, heap) = if size <= state.capacity - state.index {
            // SAFETY: index + size <= capacity, and the buffer holds
            // `capacity` items.
            let ptr = unsafe { state.blocks.byte_ptr(state.index * item_size) };
            state.index += size;
            (ptr, None)
        } else {
            tracing::debug!(
                item = std::any::type_name::<T>(),
                name,
                requested = size,
                remaining = state.capacity - state.index,
                "arena slab overflow, falling back to heap"
            );
            state.heap_fallbacks += 1;
            let heap = RawBlocks::zeroed(Self::blocks_for(size));
            // SAFETY: offset 0 is always in bounds.
            let ptr = unsafe { heap.byte_ptr(0) };
            (ptr, Some(heap))
        };

        state.allocation += size;
        state.max_allocation = state.max_allocation.max(state.allocation);

        let serial = state.next_serial;
        state.next_serial += 1;
        let used_malloc = heap.is_some();
        state.entries.push(ArenaEntry {
            serial,
            size,
            heap,
            name,
            abandoned: false,
        });

        Reservation {
            ptr: ptr.cast::<T>(),
            reserved: size,
            serial,
            used_malloc,
        }
    }

    /// Releases the entry for `serial`, which must be the top entry.
    ///
    /// A rejected free leaves the slab untouched.
    fn free(&self, serial: u64, name: &'static str) -> ArenaResult<()> {
        let mut state = self.state.lock();

        let (top_serial, top_name) = state
            .entries
            .last()
            .map(|entry| (entry.serial, entry.name))
            .ok_or(ArenaError::FreeWithoutAllocate {
                type_name: std::any::type_name::<T>(),
            })?;

        if top_serial != serial {
            return Err(ArenaError::OutOfOrderFree {
                type_name: std::any::type_name::<T>(),
                freed: name,
                expected: top_name,
            });
        }

        state.release_top();
        while state.entries.last().is_some_and(|entry| entry.abandoned) {
            state.release_top();
        }
        Ok(())
    }

    /// Marks the entry for `serial` for release once every later entry is
    /// gone.
    fn abandon(&self, serial: u64) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.iter_mut().find(|entry| entry.serial == serial) {
            entry.abandoned = true;
        }
    }
}

impl SlabState {
    fn release_top(&mut self) {
        if let Some(entry) = self.entries.pop() {
            // Heap blocks are released when the entry drops.
            if entry.heap.is_none() {
                self.index -= entry.size;
            }
            self.allocation -= entry.size;
        }
    }
}

impl<T: Zeroable + Copy + 'static> SlabOps for ArenaSlab<T> {
    fn stats(&self) -> SlabStats {
        let state = self.state.lock();
        SlabStats {
            type_name: std::any::type_name::<T>(),
            registry_index: self.registry_index,
            capacity: state.capacity,
            index: state.index,
            allocation: state.allocation,
            max_allocation: state.max_allocation,
            live_entries: state.entries.len(),
            heap_fallbacks: state.heap_fallbacks,
        }
    }

    fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.allocation == 0 && state.entries.is_empty()
    }

    fn grow(&self) -> ArenaResult<bool> {
        let mut state = self.state.lock();
        if state.allocation != 0 || !state.entries.is_empty() {
            return Err(ArenaError::SlabBusy {
                type_name: std::any::type_name::<T>(),
                allocation: state.allocation,
            });
        }

        if state.max_allocation <= state.capacity {
            return Ok(false);
        }

        let capacity = state.max_allocation.saturating_add(state.max_allocation / 2);
        tracing::debug!(
            item = std::any::type_name::<T>(),
            old_capacity = state.capacity,
            new_capacity = capacity,
            peak = state.max_allocation,
            "growing arena slab"
        );

        state.blocks = RawBlocks::zeroed(Self::blocks_for(capacity));
        state.capacity = capacity;
        state.index = 0;
        state.max_allocation = 0;
        Ok(true)
    }
}

/// A live arena allocation of `len` items of `T`.
///
/// Dereferences to `[T]`. Contents start out either zeroed or holding
/// values left by an earlier allocation of the same type.
///
/// Items must be released in the reverse order they were allocated. Call
/// [`free`](Self::free) to release explicitly; dropping an item releases it
/// implicitly. Either way an ordering error is reported through the
/// contract hook. An item dropped out of order keeps its region until every
/// later allocation on the slab is gone. Locals drop in reverse declaration
/// order, so plain scoping is already LIFO.
///
/// # Example
///
/// ```rust,ignore
/// let impulses = arena.allocate_item::<Impulse>(contact_count, "impulses");
/// let scratch = arena.allocate_item::<Impulse>(64, "scratch");
/// scratch.free().map_err(|rejected| rejected.error().clone())?;
/// impulses.free().map_err(|rejected| rejected.error().clone())?;
/// ```
#[must_use = "dropping an arena item frees it immediately"]
pub struct ArenaItem<'a, T: Zeroable + Copy + 'static> {
    slab: Arc<ArenaSlab<T>>,
    ptr: NonNull<T>,
    len: usize,
    reserved: usize,
    serial: u64,
    used_malloc: bool,
    name: &'static str,
    released: bool,
    _arena: PhantomData<&'a ()>,
}

// SAFETY: the item exclusively owns its region; slab bookkeeping is behind
// a mutex.
unsafe impl<T: Zeroable + Copy + Send + 'static> Send for ArenaItem<'_, T> {}
// SAFETY: shared access only hands out `&[T]`.
unsafe impl<T: Zeroable + Copy + Sync + 'static> Sync for ArenaItem<'_, T> {}

impl<'a, T: Zeroable + Copy + 'static> ArenaItem<'a, T> {
    pub(crate) fn allocate(slab: Arc<ArenaSlab<T>>, len: usize, name: &'static str) -> Self {
        let reservation = slab.allocate(len, name);
        Self {
            slab,
            ptr: reservation.ptr,
            len,
            reserved: reservation.reserved,
            serial: reservation.serial,
            used_malloc: reservation.used_malloc,
            name,
            released: false,
            _arena: PhantomData,
        }
    }

    /// Items reserved for this allocation, after alignment rounding.
    #[inline]
    #[must_use]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Returns `true` if the request overflowed the slab and was served
    /// from the heap.
    #[inline]
    #[must_use]
    pub fn used_malloc(&self) -> bool {
        self.used_malloc
    }

    /// Diagnostic tag given at allocation.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Releases the allocation.
    ///
    /// A rejected free is a contract violation and is reported through the
    /// hook first. With the default hook that panics. A hook that returns
    /// gets the item handed back in the error, still live, so it can be
    /// freed again in the right order.
    ///
    /// # Errors
    ///
    /// [`ArenaError::OutOfOrderFree`] inside [`RejectedFree`] if a later
    /// allocation on the same slab is still live.
    pub fn free(mut self) -> Result<(), RejectedFree<'a, T>> {
        match self.slab.free(self.serial, self.name) {
            Ok(()) => {
                self.released = true;
                Ok(())
            }
            Err(error) => {
                contract::violation(format_args!("{error}"));
                Err(RejectedFree { error, item: self })
            }
        }
    }
}

impl<T: Zeroable + Copy + 'static> Deref for ArenaItem<'_, T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        // SAFETY: the region holds `reserved >= len` initialized items,
        // is aligned for T, and is exclusively owned by this item.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Zeroable + Copy + 'static> DerefMut for ArenaItem<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in `deref`, and `&mut self` guarantees uniqueness.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Zeroable + Copy + 'static> Drop for ArenaItem<'_, T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.slab.free(self.serial, self.name) {
            self.slab.abandon(self.serial);
            contract::violation(format_args!("{err}"));
        }
    }
}

impl<T: Zeroable + Copy + 'static> fmt::Debug for ArenaItem<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaItem")
            .field("type", &std::any::type_name::<T>())
            .field("name", &self.name)
            .field("len", &self.len)
            .field("reserved", &self.reserved)
            .field("used_malloc", &self.used_malloc)
            .finish()
    }
}

/// An explicit [`ArenaItem::free`] the slab refused, with the item still
/// live.
///
/// Dropping this drops the item, which marks its region for release once
/// every later allocation on the slab is gone.
#[derive(Error)]
#[error("{error}")]
pub struct RejectedFree<'a, T: Zeroable + Copy + 'static> {
    error: ArenaError,
    item: ArenaItem<'a, T>,
}

impl<'a, T: Zeroable + Copy + 'static> RejectedFree<'a, T> {
    /// Why the free was refused.
    #[must_use]
    pub fn error(&self) -> &ArenaError {
        &self.error
    }

    /// Takes the item back.
    #[must_use]
    pub fn into_item(self) -> ArenaItem<'a, T> {
        self.item
    }
}

impl<T: Zeroable + Copy + 'static> fmt::Debug for RejectedFree<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectedFree")
            .field("error", &self.error)
            .field("item", &self.item)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(Clone, Copy, Zeroable)]
    #[repr(C)]
    struct Row([f32; 8]);

    #[allow(dead_code)]
    #[derive(Clone, Copy, Zeroable)]
    #[repr(C)]
    struct Triple([f32; 3]);

    fn slab<T: Zeroable + Copy + 'static>(capacity: usize) -> Arc<ArenaSlab<T>> {
        Arc::new(ArenaSlab::new(0, capacity))
    }

    #[test]
    fn test_round_len() {
        assert_eq!(ArenaSlab::<Row>::round_len(100), 100);
        assert_eq!(ArenaSlab::<f32>::round_len(100), 104);
        assert_eq!(ArenaSlab::<u8>::round_len(1), 32);
        assert_eq!(ArenaSlab::<Triple>::round_len(1), 8);
        assert_eq!(ArenaSlab::<u64>::round_len(0), 0);
    }

    #[test]
    fn test_regions_are_aligned() {
        let slab = slab::<Triple>(64);
        let a = ArenaItem::allocate(Arc::clone(&slab), 3, "a");
        let b = ArenaItem::allocate(Arc::clone(&slab), 5, "b");
        assert_eq!(a.as_ptr() as usize % ARENA_ALIGNMENT, 0);
        assert_eq!(b.as_ptr() as usize % ARENA_ALIGNMENT, 0);
        assert_eq!(slab.stats().index, 16);
        b.free().unwrap();
        a.free().unwrap();
    }

    #[test]
    fn test_items_do_not_overlap() {
        let slab = slab::<u32>(64);
        let mut a = ArenaItem::allocate(Arc::clone(&slab), 8, "a");
        let mut b = ArenaItem::allocate(Arc::clone(&slab), 8, "b");
        a.fill(1);
        b.fill(2);
        assert!(a.iter().all(|&v| v == 1));
        assert!(b.iter().all(|&v| v == 2));
    }

    #[test]
    fn test_drop_frees_in_reverse_order() {
        let slab = slab::<Row>(16);
        {
            let _a = ArenaItem::allocate(Arc::clone(&slab), 4, "a");
            let _b = ArenaItem::allocate(Arc::clone(&slab), 4, "b");
            assert_eq!(slab.stats().allocation, 8);
        }
        let stats = slab.stats();
        assert_eq!(stats.allocation, 0);
        assert_eq!(stats.index, 0);
        assert_eq!(stats.live_entries, 0);
    }

    #[test]
    #[should_panic(expected = "most recent is `full`")]
    fn test_zero_length_items_keep_identity() {
        let slab = slab::<Row>(16);
        let empty = ArenaItem::allocate(Arc::clone(&slab), 0, "empty");
        let _full = ArenaItem::allocate(Arc::clone(&slab), 4, "full");
        assert!(empty.is_empty());
        let _ = empty.free();
    }

    #[test]
    fn test_abandoned_entries_are_reclaimed_under_the_top() {
        let slab = slab::<Row>(16);
        let a = ArenaItem::allocate(Arc::clone(&slab), 4, "a");
        let b = ArenaItem::allocate(Arc::clone(&slab), 4, "b");
        let c = ArenaItem::allocate(Arc::clone(&slab), 4, "c");

        // Only valid while `c` is live; mark `b` as dropped out of order.
        slab.abandon(b.serial);
        std::mem::forget(b);
        assert_eq!(slab.stats().live_entries, 3);

        c.free().unwrap();
        let stats = slab.stats();
        assert_eq!(stats.live_entries, 1);
        assert_eq!(stats.index, 4);
        a.free().unwrap();
        assert_eq!(slab.stats().allocation, 0);
        assert_eq!(slab.grow(), Ok(false));
    }

    #[test]
    #[should_panic(expected = "capacity overflow")]
    fn test_unaddressable_length_is_fatal() {
        let _ = ArenaSlab::<f32>::round_len(usize::MAX);
    }

    #[test]
    #[should_panic(expected = "capacity overflow")]
    fn test_unaddressable_byte_size_is_fatal() {
        let _ = ArenaSlab::<Row>::round_len(usize::MAX / 8);
    }

    #[test]
    fn test_grow_refuses_while_busy() {
        let slab = slab::<Row>(2);
        let item = ArenaItem::allocate(Arc::clone(&slab), 4, "big");
        assert!(item.used_malloc());
        assert!(matches!(slab.grow(), Err(ArenaError::SlabBusy { allocation: 4, .. })));
        item.free().unwrap();
        assert_eq!(slab.grow(), Ok(true));
        assert_eq!(slab.stats().capacity, 6);
    }
}
