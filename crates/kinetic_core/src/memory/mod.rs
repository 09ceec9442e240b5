//! # Memory Management
//!
//! The containers and allocators every other subsystem is built on.
//!
//! ## Design Philosophy
//!
//! All step-scoped scratch memory comes from the arena. During a step:
//! - No general-purpose heap traffic unless a slab overflows
//! - Overflow is never an error, only a logged slow path
//! - Slabs adapt between steps so overflow dies out

mod arena;
mod array;
mod bitset;
mod id_pool;
mod registry;
mod slab;
pub mod tracked;

pub use arena::{ArenaAllocator, ArenaStats};
pub use array::{GrowableArray, SwapRemoved};
pub use bitset::{BitSet, SetBits, BLOCK_BITS};
pub use id_pool::IdPool;
pub use registry::TypeSlabRegistry;
pub use slab::{ArenaItem, RejectedFree, SlabStats, ARENA_ALIGNMENT};
