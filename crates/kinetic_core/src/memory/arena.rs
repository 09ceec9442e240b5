//! # Step Arena Allocator
//!
//! Scratch memory for one simulation step: contact working sets, solver
//! constraint arrays, island stacks. Each item type gets its own slab,
//! created the first time the type is requested.
//!
//! ## Lookup
//!
//! ```text
//!   allocate_item::<T>()
//!          │
//!          ▼
//!   registry.index_of::<T>() ──► table snapshot (ArcSwap, lock-free)
//!                                    │ hit           │ miss
//!                                    ▼               ▼
//!                                  slab        slabs mutex:
//!                                              copy table, insert slab,
//!                                              publish new snapshot
//! ```
//!
//! ## Thread Safety
//!
//! Slab lookup and creation are safe from any thread. Allocating and
//! freeing on one slab is a stack: two threads interleaving on the same
//! item type will trip the LIFO check. Give each worker its own allocator,
//! or keep a type's allocations on one thread for the duration of a step.

use std::any::Any;
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytemuck::Zeroable;
use parking_lot::Mutex;

use super::registry::TypeSlabRegistry;
use super::slab::{ArenaItem, ArenaSlab, RejectedFree, SlabOps, SlabStats};
use crate::config::ArenaConfig;
use crate::contract;
use crate::error::{ArenaError, ArenaResult};

type SlabSlot = Option<Arc<dyn Any + Send + Sync>>;

/// Totals across every slab of an allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Number of slabs created so far.
    pub slab_count: usize,
    /// Sum of slab stack capacities, in items.
    pub capacity: usize,
    /// Sum of items outstanding.
    pub allocation: usize,
    /// Sum of per-slab peaks.
    pub max_allocation: usize,
    /// Sum of heap fallbacks.
    pub heap_fallbacks: u64,
}

/// Per-step stack allocator with one slab per item type.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena = ArenaAllocator::new(4096);
///
/// for _ in 0..steps {
///     {
///         let contacts = arena.allocate_item::<ContactConstraint>(n, "contacts");
///         let bodies = arena.allocate_item::<BodySim>(m, "awake bodies");
///         solve(&contacts, &bodies);
///     } // freed in reverse order
///
///     // Between steps: resize slabs that overflowed.
///     arena.grow()?;
/// }
/// ```
pub struct ArenaAllocator {
    config: ArenaConfig,
    registry: Arc<TypeSlabRegistry>,
    /// Registry index → slab. Replaced wholesale when it grows.
    table: ArcSwap<Vec<SlabSlot>>,
    /// Every slab in creation order. Also serializes slab creation.
    slabs: Mutex<Vec<Arc<dyn SlabOps>>>,
}

impl ArenaAllocator {
    /// Creates an allocator whose slabs start with `default_capacity` items.
    #[must_use]
    pub fn new(default_capacity: usize) -> Self {
        Self::with_config(ArenaConfig::new(default_capacity))
    }

    /// Creates an allocator from a full config, using the global registry.
    #[must_use]
    pub fn with_config(config: ArenaConfig) -> Self {
        Self::with_registry(config, TypeSlabRegistry::global())
    }

    /// Creates an allocator that resolves item types through `registry`.
    #[must_use]
    pub fn with_registry(config: ArenaConfig, registry: Arc<TypeSlabRegistry>) -> Self {
        let table = vec![None; config.initial_table_len];
        Self {
            config,
            registry,
            table: ArcSwap::from_pointee(table),
            slabs: Mutex::new(Vec::new()),
        }
    }

    /// Stack capacity given to newly created slabs.
    #[inline]
    #[must_use]
    pub fn default_capacity(&self) -> usize {
        self.config.default_capacity
    }

    /// Allocates `len` items of `T`.
    ///
    /// Served from `T`'s slab when it has room, otherwise from the heap.
    /// `name` tags the allocation in overflow logs and ordering errors.
    pub fn allocate_item<T>(&self, len: usize, name: &'static str) -> ArenaItem<'_, T>
    where
        T: Zeroable + Copy + Send + 'static,
    {
        ArenaItem::allocate(self.slab::<T>(), len, name)
    }

    /// Releases `item`. Same as [`ArenaItem::free`].
    ///
    /// # Errors
    ///
    /// [`RejectedFree`] carrying [`ArenaError::OutOfOrderFree`] and the item
    /// itself if `item` is not the most recent live allocation of its type.
    pub fn free_item<'a, T>(&self, item: ArenaItem<'a, T>) -> Result<(), RejectedFree<'a, T>>
    where
        T: Zeroable + Copy + Send + 'static,
    {
        item.free()
    }

    /// Resizes every slab whose peak usage exceeded its capacity to 1.5x
    /// that peak, and returns how many slabs grew.
    ///
    /// Call between steps. Taking `&mut self` guarantees no item borrowed
    /// from this allocator is alive.
    ///
    /// # Errors
    ///
    /// [`ArenaError::SlabBusy`] if any slab still has entries (an item was
    /// leaked or failed an ordering check). Nothing is resized in that case.
    pub fn grow(&mut self) -> ArenaResult<usize> {
        let slabs = self.slabs.lock();

        if let Some(busy) = slabs.iter().find(|slab| !slab.is_idle()) {
            let stats = busy.stats();
            return Err(ArenaError::SlabBusy {
                type_name: stats.type_name,
                allocation: stats.allocation,
            });
        }

        let mut grown = 0;
        for slab in slabs.iter() {
            if slab.grow()? {
                grown += 1;
            }
        }
        Ok(grown)
    }

    /// Sum of slab capacities, in items.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.stats().capacity
    }

    /// Sum of items currently allocated.
    #[must_use]
    pub fn allocation(&self) -> usize {
        self.stats().allocation
    }

    /// Sum of per-slab peak allocations.
    #[must_use]
    pub fn max_allocation(&self) -> usize {
        self.stats().max_allocation
    }

    /// Totals across all slabs.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        self.slabs
            .lock()
            .iter()
            .map(|slab| slab.stats())
            .fold(ArenaStats::default(), |mut total, slab| {
                total.slab_count += 1;
                total.capacity += slab.capacity;
                total.allocation += slab.allocation;
                total.max_allocation += slab.max_allocation;
                total.heap_fallbacks += slab.heap_fallbacks;
                total
            })
    }

    /// Per-slab statistics in creation order.
    #[must_use]
    pub fn slab_stats(&self) -> Vec<SlabStats> {
        self.slabs.lock().iter().map(|slab| slab.stats()).collect()
    }

    /// Statistics for `T`'s slab, or `None` if `T` was never allocated here.
    #[must_use]
    pub fn slab_stats_for<T>(&self) -> Option<SlabStats>
    where
        T: Zeroable + Copy + Send + 'static,
    {
        self.lookup::<T>().map(|slab| slab.stats())
    }

    /// Fast path: a lock-free read of the current table snapshot.
    fn lookup<T>(&self) -> Option<Arc<ArenaSlab<T>>>
    where
        T: Zeroable + Copy + Send + 'static,
    {
        let index = self.registry.index_of::<T>() as usize;
        let slot = self.table.load().get(index).and_then(Clone::clone)?;
        Some(downcast_slab(slot))
    }

    fn slab<T>(&self) -> Arc<ArenaSlab<T>>
    where
        T: Zeroable + Copy + Send + 'static,
    {
        match self.lookup::<T>() {
            Some(slab) => slab,
            None => self.create_slab::<T>(),
        }
    }

    /// Slow path: first use of `T`, under the slab list lock.
    fn create_slab<T>(&self) -> Arc<ArenaSlab<T>>
    where
        T: Zeroable + Copy + Send + 'static,
    {
        let mut slabs = self.slabs.lock();
        let registry_index = self.registry.index_of::<T>();
        let index = registry_index as usize;

        // Another thread may have won the race while we waited.
        let current = self.table.load_full();
        if let Some(Some(existing)) = current.get(index) {
            return downcast_slab(Arc::clone(existing));
        }

        let mut table = Vec::clone(&current);
        if index >= table.len() {
            let len = (index + 1).max(table.len() * 2);
            tracing::trace!(old_len = table.len(), new_len = len, "growing arena slab table");
            table.resize(len, None);
        }

        let slab = Arc::new(ArenaSlab::<T>::new(registry_index, self.config.default_capacity));
        tracing::debug!(
            item = std::any::type_name::<T>(),
            registry_index,
            capacity = self.config.default_capacity,
            "created arena slab"
        );

        table[index] = Some(Arc::clone(&slab) as Arc<dyn Any + Send + Sync>);
        self.table.store(Arc::new(table));
        slabs.push(Arc::clone(&slab) as Arc<dyn SlabOps>);
        slab
    }
}

impl Default for ArenaAllocator {
    fn default() -> Self {
        Self::with_config(ArenaConfig::default())
    }
}

impl Drop for ArenaAllocator {
    fn drop(&mut self) {
        for stats in self.slab_stats() {
            if stats.live_entries != 0 {
                tracing::warn!(
                    item = stats.type_name,
                    live_entries = stats.live_entries,
                    allocation = stats.allocation,
                    "arena destroyed with allocations still recorded"
                );
            }
        }
    }
}

impl std::fmt::Debug for ArenaAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn downcast_slab<T>(slot: Arc<dyn Any + Send + Sync>) -> Arc<ArenaSlab<T>>
where
    T: Zeroable + Copy + Send + 'static,
{
    match slot.downcast::<ArenaSlab<T>>() {
        Ok(slab) => slab,
        Err(_) => contract::fatal(format_args!(
            "slab table entry does not hold `{}`",
            std::any::type_name::<T>()
        )),
    }
}
