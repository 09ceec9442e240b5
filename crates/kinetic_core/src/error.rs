//! # Core Error Types
//!
//! Every fallible operation in the substrate reports one of these. They are
//! all programmer errors except [`ConfigError`]: the call that returns them
//! is the call that broke the contract.

use thiserror::Error;

/// Errors raised by [`GrowableArray`](crate::memory::GrowableArray).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionError {
    /// Index was not below the logical length.
    #[error("index out of range: index {index}, length {len}")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Logical length at the time of the call.
        len: usize,
    },
}

/// Errors raised by [`BitSet`](crate::memory::BitSet).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitSetError {
    /// `grow` must strictly increase the block count.
    #[error("bit set grow must increase block count: current {current}, requested {requested}")]
    NonIncreasingGrow {
        /// Block count before the call.
        current: usize,
        /// Block count that was requested.
        requested: usize,
    },

    /// Union of two sets with different block counts.
    #[error("bit set union requires equal block counts: {left} vs {right}")]
    BlockCountMismatch {
        /// Block count of the destination set.
        left: usize,
        /// Block count of the source set.
        right: usize,
    },
}

/// Errors raised by the per-step [`ArenaAllocator`](crate::memory::ArenaAllocator).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// A free on a slab with no live entries.
    #[error("free without matching allocate on slab `{type_name}`")]
    FreeWithoutAllocate {
        /// Item type of the slab.
        type_name: &'static str,
    },

    /// The freed item is not the most recent allocation on its slab.
    #[error("out-of-order free on slab `{type_name}`: freed `{freed}`, most recent is `{expected}`")]
    OutOfOrderFree {
        /// Item type of the slab.
        type_name: &'static str,
        /// Name tag of the item that was freed.
        freed: &'static str,
        /// Name tag of the item that must be freed first.
        expected: &'static str,
    },

    /// A slab can only be resized once every allocation has been freed.
    #[error("slab `{type_name}` still has {allocation} items outstanding")]
    SlabBusy {
        /// Item type of the slab.
        type_name: &'static str,
        /// Items still allocated.
        allocation: usize,
    },
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML document did not describe a valid configuration.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;
