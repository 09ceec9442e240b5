//! # Growable Array
//!
//! Contiguous, resizable storage with an explicit length/capacity split
//! and a fixed 1.5x growth policy. Bodies, shapes, contact sets and the
//! arena's entry stacks are all stored in these.
//!
//! Elements are moved in and out by value, so a removed slot never keeps
//! an old value alive.

use std::fmt;
use std::ops::{Index, IndexMut};

use super::tracked;
use crate::error::CollectionError;

/// Result of [`GrowableArray::remove_swap`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapRemoved<T> {
    /// The element that was removed.
    pub value: T,
    /// Former index of the element that was moved into the hole, or `None`
    /// if the removed element was already last.
    ///
    /// Callers holding back-references to array slots must repoint the
    /// moved element from this index to the removed one.
    pub moved_from: Option<usize>,
}

/// A growable array with amortized 1.5x growth.
///
/// # Example
///
/// ```rust,ignore
/// let mut contacts: GrowableArray<ContactId> = GrowableArray::with_capacity(64);
/// let index = contacts.push(id);
/// if let Some(moved) = contacts.remove_swap(index)?.moved_from {
///     // fix up whatever pointed at `moved`
/// }
/// ```
pub struct GrowableArray<T> {
    /// Backing storage. Never grows on its own: `capacity` decides.
    items: Vec<T>,
    /// Allocated length in elements.
    capacity: usize,
}

impl<T> GrowableArray<T> {
    /// Creates an empty array without allocating.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            capacity: 0,
        }
    }

    /// Creates an empty array with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            return Self::new();
        }
        Self {
            items: tracked::alloc_vec(capacity),
            capacity,
        }
    }

    /// Number of live elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if there are no live elements.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Allocated length in elements.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ensures room for at least `new_capacity` elements.
    ///
    /// No-op if the array is already that large; otherwise reallocates to
    /// exactly `new_capacity`.
    pub fn reserve(&mut self, new_capacity: usize) {
        if new_capacity <= self.capacity {
            return;
        }
        self.reallocate(new_capacity);
    }

    /// Appends `value` and returns its index.
    pub fn push(&mut self, value: T) -> usize {
        if self.items.len() == self.capacity {
            self.grow_to_fit(self.capacity + 1);
        }
        self.items.push(value);
        self.items.len() - 1
    }

    /// Returns the element at `index`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] if `index >= len`.
    #[inline]
    pub fn get(&self, index: usize) -> Result<&T, CollectionError> {
        let len = self.items.len();
        self.items
            .get(index)
            .ok_or(CollectionError::IndexOutOfRange { index, len })
    }

    /// Returns the element at `index` mutably.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] if `index >= len`.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, CollectionError> {
        let len = self.items.len();
        self.items
            .get_mut(index)
            .ok_or(CollectionError::IndexOutOfRange { index, len })
    }

    /// Overwrites the element at `index`, returning the previous value.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] if `index >= len`.
    pub fn set(&mut self, index: usize, value: T) -> Result<T, CollectionError> {
        self.get_mut(index).map(|slot| std::mem::replace(slot, value))
    }

    /// Removes the element at `index` by moving the last element into it.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] if `index >= len`.
    pub fn remove_swap(&mut self, index: usize) -> Result<SwapRemoved<T>, CollectionError> {
        let len = self.items.len();
        if index >= len {
            return Err(CollectionError::IndexOutOfRange { index, len });
        }

        let last = len - 1;
        let value = self.items.swap_remove(index);
        let moved_from = (index != last).then_some(last);
        Ok(SwapRemoved { value, moved_from })
    }

    /// Removes and returns the last element, or `None` if empty.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Returns the last element, or `None` if empty.
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// Drops every element. Capacity is retained.
    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Releases the backing buffer, leaving an empty array.
    pub fn destroy(&mut self) {
        tracked::free_vec(std::mem::take(&mut self.items));
        self.capacity = 0;
    }

    /// Size of the backing buffer in bytes.
    ///
    /// Returns `None` for element types that own resources (anything that
    /// needs drop), since their footprint is not captured by the buffer.
    #[must_use]
    pub fn byte_count(&self) -> Option<usize> {
        if std::mem::needs_drop::<T>() {
            None
        } else {
            Some(self.capacity * std::mem::size_of::<T>())
        }
    }

    /// Live elements as a slice.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Live elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    /// Iterates over live elements.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterates mutably over live elements.
    #[inline]
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Grows by the 1.5x policy, but never below `min_capacity`.
    fn grow_to_fit(&mut self, min_capacity: usize) {
        let grown = (self.capacity + self.capacity / 2).max(2);
        self.reallocate(grown.max(min_capacity));
    }

    fn reallocate(&mut self, new_capacity: usize) {
        let mut items = tracked::alloc_vec(new_capacity);
        items.append(&mut self.items);
        tracked::free_vec(std::mem::replace(&mut self.items, items));
        self.capacity = new_capacity;
    }
}

impl<T: Default> GrowableArray<T> {
    /// Appends a default element and returns it for in-place initialization.
    pub fn add(&mut self) -> &mut T {
        let index = self.push(T::default());
        &mut self.items[index]
    }

    /// Sets the length to `count`, reserving exactly as needed.
    ///
    /// New slots hold `T::default()`. Shrinking drops the tail.
    pub fn resize(&mut self, count: usize) {
        self.reserve(count);
        self.items.resize_with(count, T::default);
    }
}

impl<T: Clone> GrowableArray<T> {
    /// Appends clones of every element in `values`.
    pub fn extend_from_slice(&mut self, values: &[T]) {
        let needed = self.items.len() + values.len();
        if needed > self.capacity {
            self.grow_to_fit(needed);
        }
        self.items.extend_from_slice(values);
    }
}

impl<T> Default for GrowableArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for GrowableArray<T> {
    fn clone(&self) -> Self {
        let mut copy = Self::with_capacity(self.capacity);
        copy.items.extend_from_slice(&self.items);
        copy
    }
}

impl<T: fmt::Debug> fmt::Debug for GrowableArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<T> Drop for GrowableArray<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<T> Index<usize> for GrowableArray<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<T> IndexMut<usize> for GrowableArray<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.items[index]
    }
}

impl<'a, T> IntoIterator for &'a GrowableArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
