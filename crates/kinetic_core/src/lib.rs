//! # KINETIC Core
//!
//! The memory substrate under the rigid-body step:
//! - Growable arrays, bit sets and id pools for every entity table
//! - A per-step arena with one stack slab per item type
//! - Generational handles for references that outlive a slot
//!
//! ## Architecture Rules
//!
//! 1. **Step scratch comes from the arena** - Slabs adapt between steps
//! 2. **Frees are strictly LIFO** - Checked on every free, in every build
//! 3. **Misuse surfaces at the call** - `Result` where there is a return
//!    channel, the [`contract`] hook where there is not
//!
//! ## Example
//!
//! ```rust,ignore
//! use kinetic_core::{ArenaAllocator, BitSet, IdPool};
//!
//! let mut arena = ArenaAllocator::new(4096);
//! let mut body_ids = IdPool::new();
//! let mut awake = BitSet::new(1024);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod contract;
pub mod error;
pub mod handle;
pub mod memory;

pub use config::ArenaConfig;
pub use contract::{reset_violation_hook, set_violation_hook, ContractViolation};
pub use error::{ArenaError, ArenaResult, BitSetError, CollectionError, ConfigError};
pub use handle::{Handle, HandleTable};
pub use memory::{
    ArenaAllocator, ArenaItem, ArenaStats, BitSet, GrowableArray, IdPool, RejectedFree,
    SlabStats, SwapRemoved, TypeSlabRegistry,
};
