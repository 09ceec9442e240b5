//! # Type Slab Registry
//!
//! Assigns every distinct item type a small integer index, exactly once,
//! even when several threads touch a type for the first time together.
//! Arena allocators use the index to find the slab for a type without
//! hashing on the hot path.
//!
//! Indices are never freed or reused.

use std::any::TypeId;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

static GLOBAL: OnceLock<Arc<TypeSlabRegistry>> = OnceLock::new();

/// Concurrent map from item type to slab index.
///
/// # Thread Safety
///
/// `index_of` is safe to call from any number of threads. Assignment goes
/// through the map's entry lock, so two types can never share an index and
/// a type never receives two.
#[derive(Debug, Default)]
pub struct TypeSlabRegistry {
    indices: DashMap<TypeId, u32>,
    next_index: AtomicU32,
}

impl TypeSlabRegistry {
    /// Creates an isolated registry whose indices start at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry shared by default-constructed allocators.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Returns the index for `T`, assigning the next free one on first use.
    pub fn index_of<T: 'static>(&self) -> u32 {
        let type_id = TypeId::of::<T>();
        if let Some(index) = self.indices.get(&type_id) {
            return *index;
        }

        *self.indices.entry(type_id).or_insert_with(|| {
            let index = self.next_index.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                index,
                item = std::any::type_name::<T>(),
                "registered arena item type"
            );
            index
        })
    }

    /// Number of types registered so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.next_index.load(Ordering::Relaxed) as usize
    }

    /// Returns `true` if no type has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
