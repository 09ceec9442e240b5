//! # Dynamic Bit Set
//!
//! A resizable run of 64-bit words. The step uses these for dirty tracking
//! (moved shapes, touched contacts, changed joints) and per-worker task
//! bookkeeping, then merges the per-worker sets with [`BitSet::in_place_union`].
//!
//! Words at or past `block_count` are reserve storage: they are kept zeroed
//! and never read by counting or union.

use super::tracked;
use crate::contract::debug_contract;
use crate::error::BitSetError;

/// Bits per block.
pub const BLOCK_BITS: usize = u64::BITS as usize;

/// A growable set of bits backed by 64-bit blocks.
///
/// # Example
///
/// ```rust,ignore
/// let mut moved = BitSet::new(shape_capacity);
/// moved.set_bit_grow(shape_id);
/// for shape_id in moved.iter_ones() {
///     // refit proxy
/// }
/// ```
pub struct BitSet {
    /// Backing words; `len()` is the block capacity.
    blocks: Box<[u64]>,
    /// Number of blocks in logical use.
    block_count: usize,
}

impl BitSet {
    /// Creates a set able to hold `bit_capacity` bits, all clear.
    #[must_use]
    pub fn new(bit_capacity: usize) -> Self {
        let block_count = bit_capacity.div_ceil(BLOCK_BITS);
        Self {
            blocks: tracked::alloc_buffer(block_count),
            block_count,
        }
    }

    /// Number of blocks in logical use.
    #[inline]
    #[must_use]
    pub const fn block_count(&self) -> usize {
        self.block_count
    }

    /// Number of allocated blocks.
    #[inline]
    #[must_use]
    pub fn block_capacity(&self) -> usize {
        self.blocks.len()
    }

    /// Number of addressable bits without growing.
    #[inline]
    #[must_use]
    pub const fn bit_capacity(&self) -> usize {
        self.block_count * BLOCK_BITS
    }

    /// Logical blocks as a slice.
    #[inline]
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.blocks[..self.block_count]
    }

    /// Sets bit `index`.
    ///
    /// The index must be below [`bit_capacity`](Self::bit_capacity). That is
    /// a debug-only contract; in release builds an out-of-range index is
    /// ignored.
    #[inline]
    pub fn set_bit(&mut self, index: usize) {
        let block = index / BLOCK_BITS;
        debug_contract!(
            block < self.block_count,
            "bit {index} is beyond bit capacity {}",
            self.bit_capacity()
        );
        if block < self.block_count {
            self.blocks[block] |= 1 << (index % BLOCK_BITS);
        }
    }

    /// Sets bit `index`, growing the set first if it is out of range.
    pub fn set_bit_grow(&mut self, index: usize) {
        let block = index / BLOCK_BITS;
        if block >= self.block_count {
            self.grow_blocks(block + 1);
        }
        self.blocks[block] |= 1 << (index % BLOCK_BITS);
    }

    /// Clears bit `index`. Clearing a bit past the end is a no-op.
    #[inline]
    pub fn clear_bit(&mut self, index: usize) {
        let block = index / BLOCK_BITS;
        if block < self.block_count {
            self.blocks[block] &= !(1 << (index % BLOCK_BITS));
        }
    }

    /// Returns bit `index`; bits past the end read as clear.
    #[inline]
    #[must_use]
    pub fn get_bit(&self, index: usize) -> bool {
        let block = index / BLOCK_BITS;
        block < self.block_count && self.blocks[block] & (1 << (index % BLOCK_BITS)) != 0
    }

    /// Population count over the logical blocks.
    #[must_use]
    pub fn count_set_bits(&self) -> usize {
        self.words().iter().map(|w| w.count_ones() as usize).sum()
    }

    /// ORs every bit of `other` into `self`.
    ///
    /// # Errors
    ///
    /// [`BitSetError::BlockCountMismatch`] if the block counts differ.
    pub fn in_place_union(&mut self, other: &BitSet) -> Result<(), BitSetError> {
        if self.block_count != other.block_count {
            return Err(BitSetError::BlockCountMismatch {
                left: self.block_count,
                right: other.block_count,
            });
        }

        for (dst, src) in self.blocks[..self.block_count].iter_mut().zip(other.words()) {
            *dst |= *src;
        }
        Ok(())
    }

    /// Raises the logical block count to `block_count`.
    ///
    /// Reallocates to 1.5x the request when it exceeds the allocated
    /// blocks. New blocks are clear.
    ///
    /// # Errors
    ///
    /// [`BitSetError::NonIncreasingGrow`] unless `block_count` is strictly
    /// larger than the current block count.
    pub fn grow(&mut self, block_count: usize) -> Result<(), BitSetError> {
        if block_count <= self.block_count {
            return Err(BitSetError::NonIncreasingGrow {
                current: self.block_count,
                requested: block_count,
            });
        }
        self.grow_blocks(block_count);
        Ok(())
    }

    /// Resizes to cover `bit_count` bits and clears every bit.
    ///
    /// Used between steps to reset a dirty set to the current entity count.
    pub fn set_bit_count_and_clear(&mut self, bit_count: usize) {
        let block_count = bit_count.div_ceil(BLOCK_BITS);
        if block_count > self.blocks.len() {
            *self = Self::new(bit_count + bit_count / 2);
        }
        self.block_count = block_count;
        self.blocks.fill(0);
    }

    /// Iterates over the indices of set bits in ascending order.
    #[inline]
    #[must_use]
    pub fn iter_ones(&self) -> SetBits<'_> {
        SetBits {
            words: self.words(),
            block: 0,
            current: self.words().first().copied().unwrap_or(0),
        }
    }

    /// Releases the backing words, leaving an empty set.
    pub fn destroy(&mut self) {
        tracked::free_buffer(std::mem::take(&mut self.blocks));
        self.block_count = 0;
    }

    fn grow_blocks(&mut self, block_count: usize) {
        if block_count > self.blocks.len() {
            let new_capacity = block_count + block_count / 2;
            let mut blocks: Box<[u64]> = tracked::alloc_buffer(new_capacity);
            blocks[..self.block_count].copy_from_slice(&self.blocks[..self.block_count]);
            tracked::free_buffer(std::mem::replace(&mut self.blocks, blocks));
        }
        self.block_count = block_count;
    }
}

impl Clone for BitSet {
    fn clone(&self) -> Self {
        let mut blocks: Box<[u64]> = tracked::alloc_buffer(self.blocks.len());
        blocks.copy_from_slice(&self.blocks);
        Self {
            blocks,
            block_count: self.block_count,
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter_ones()).finish()
    }
}

impl Drop for BitSet {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Iterator over set bits, produced by [`BitSet::iter_ones`].
pub struct SetBits<'a> {
    words: &'a [u64],
    block: usize,
    current: u64,
}

impl Iterator for SetBits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.block += 1;
            self.current = *self.words.get(self.block)?;
        }
        let bit = self.current.trailing_zeros() as usize;
        // Clear lowest set bit
        self.current &= self.current - 1;
        Some(self.block * BLOCK_BITS + bit)
    }
}
