//! # Tracked Allocation
//!
//! Every backing buffer in the substrate is obtained and released here, so
//! that one process-wide counter knows how many bytes the engine holds.
//! The counter is what step telemetry reads via [`byte_count`].

use std::sync::atomic::{AtomicUsize, Ordering};

use bytemuck::Zeroable;

static BYTE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Bytes currently held by buffers allocated through this module.
#[inline]
#[must_use]
pub fn byte_count() -> usize {
    BYTE_COUNT.load(Ordering::Relaxed)
}

#[inline]
fn record_alloc(bytes: usize) {
    BYTE_COUNT.fetch_add(bytes, Ordering::Relaxed);
}

#[inline]
fn record_free(bytes: usize) {
    BYTE_COUNT.fetch_sub(bytes, Ordering::Relaxed);
}

/// Allocates a zero-filled buffer of `count` elements.
#[must_use]
pub fn alloc_buffer<T: Zeroable>(count: usize) -> Box<[T]> {
    let buffer: Box<[T]> = (0..count).map(|_| T::zeroed()).collect();
    record_alloc(std::mem::size_of_val(&*buffer));
    buffer
}

/// Releases a buffer obtained from [`alloc_buffer`].
pub fn free_buffer<T>(buffer: Box<[T]>) {
    record_free(std::mem::size_of_val(&*buffer));
    drop(buffer);
}

/// Allocates an empty vector with room for `capacity` elements.
///
/// The vector must not grow past its capacity before it is handed back to
/// [`free_vec`], otherwise the counter drifts.
#[must_use]
pub fn alloc_vec<T>(capacity: usize) -> Vec<T> {
    let vec = Vec::with_capacity(capacity);
    record_alloc(vec_bytes::<T>(vec.capacity()));
    vec
}

/// Releases a vector obtained from [`alloc_vec`], dropping its elements.
pub fn free_vec<T>(vec: Vec<T>) {
    record_free(vec_bytes::<T>(vec.capacity()));
    drop(vec);
}

#[inline]
fn vec_bytes<T>(capacity: usize) -> usize {
    // Zero-sized types report a capacity of usize::MAX but own no memory.
    if std::mem::size_of::<T>() == 0 {
        0
    } else {
        capacity * std::mem::size_of::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The counter is process-wide and other tests allocate concurrently, so
    // these only check that the buffers themselves come back as promised.

    #[test]
    fn test_alloc_buffer_is_zeroed() {
        let buffer: Box<[u64]> = alloc_buffer(16);
        assert_eq!(buffer.len(), 16);
        assert!(buffer.iter().all(|&w| w == 0));
        free_buffer(buffer);
    }

    #[test]
    fn test_alloc_vec_has_capacity() {
        let vec: Vec<u32> = alloc_vec(10);
        assert!(vec.capacity() >= 10);
        assert!(vec.is_empty());
        free_vec(vec);
    }

    #[test]
    fn test_zero_sized_vec_tracks_nothing() {
        let vec: Vec<()> = alloc_vec(10);
        assert_eq!(vec_bytes::<()>(vec.capacity()), 0);
        free_vec(vec);
    }
}
