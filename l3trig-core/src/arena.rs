//! Indexed arena container for per-event working sets.
//!
//! Every per-event collection in the trigger (hit lists, segments, tracks,
//! clusters) lives in an [`Arena`]. Entries are addressed by index, never by
//! reference held across a push: growth reallocates the backing storage and
//! moves the entries. The allocation is kept across [`Arena::clear`] so the
//! steady state does not allocate at all.

use std::ops::{Index, IndexMut};

/// Capacity of the first allocation of an empty arena.
const MIN_CAPACITY: usize = 8;

/// Growable array with doubling growth, swap removal and logical clear.
///
/// Growth failure is fatal: the working sets are bounded a priori, so the
/// process is aborted instead of surfacing a partial-failure path.
#[derive(Debug, Clone, PartialEq)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena without allocating.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Creates an arena with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut arena = Self::new();
        arena.reserve_exact(capacity);
        arena
    }

    /// Appends an entry and returns its index.
    ///
    /// Doubles the capacity when full, which may move every entry.
    pub fn push(&mut self, value: T) -> usize {
        if self.items.len() == self.items.capacity() {
            let additional = self.items.capacity().max(MIN_CAPACITY);
            self.reserve_exact(additional);
        }
        let index = self.items.len();
        self.items.push(value);
        index
    }

    /// Removes and returns the last entry.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Removes the entry at `index` by moving the last entry into its slot.
    ///
    /// Insertion order is not preserved. A caller iterating by index must
    /// revisit `index` after the call, since it now holds an entry that has
    /// not been seen yet.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn swap_remove(&mut self, index: usize) -> T {
        self.items.swap_remove(index)
    }

    /// Replaces the entry at `index`, returning the previous one.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn replace(&mut self, index: usize, value: T) -> T {
        std::mem::replace(&mut self.items[index], value)
    }

    /// Drops all entries but keeps the allocation.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Keeps only the entries for which `keep` returns true.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.items.retain(keep);
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the arena holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of entries the arena can hold before growing.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Returns the entry at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Returns the entry at `index` mutably, if any.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// First entry.
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    /// Last entry.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// Iterates over the entries in storage order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterates mutably over the entries in storage order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Entries as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Entries as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    /// Index of the first entry equal to `value`.
    pub fn position(&self, value: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.items.iter().position(|item| item == value)
    }

    /// Returns true if some entry equals `value`.
    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.items.contains(value)
    }

    /// Appends clones of all entries of `other`.
    pub fn append(&mut self, other: &Arena<T>)
    where
        T: Clone,
    {
        let needed = self.items.len() + other.len();
        if needed > self.items.capacity() {
            let mut target = self.items.capacity().max(MIN_CAPACITY);
            while target < needed {
                target *= 2;
            }
            self.reserve_exact(target - self.items.len());
        }
        self.items.extend_from_slice(&other.items);
    }

    /// Appends the entry unless an equal one is already present.
    ///
    /// Returns the index of the (new or existing) entry.
    pub fn push_unique(&mut self, value: T) -> usize
    where
        T: PartialEq,
    {
        match self.position(&value) {
            Some(index) => index,
            None => self.push(value),
        }
    }

    fn reserve_exact(&mut self, additional: usize) {
        if let Err(err) = self.items.try_reserve_exact(additional) {
            log::error!(
                "arena growth by {additional} entries (from {}) failed: {err}",
                self.items.capacity()
            );
            std::process::abort();
        }
    }
}

impl<T> Index<usize> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<T> IndexMut<usize> for Arena<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.items[index]
    }
}

impl<'a, T> IntoIterator for &'a Arena<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> IntoIterator for Arena<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<T> FromIterator<T> for Arena<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut arena = Self::new();
        for value in iter {
            arena.push(value);
        }
        arena
    }
}

impl<T> Extend<T> for Arena<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_returns_index_and_doubles() {
        let mut arena = Arena::new();
        assert_eq!(arena.capacity(), 0);

        assert_eq!(arena.push(10), 0);
        assert_eq!(arena.capacity(), MIN_CAPACITY);

        for i in 1..MIN_CAPACITY {
            arena.push(i);
        }
        assert_eq!(arena.capacity(), MIN_CAPACITY);

        arena.push(99);
        assert_eq!(arena.capacity(), 2 * MIN_CAPACITY);
        assert_eq!(arena.len(), MIN_CAPACITY + 1);
        assert_eq!(arena[0], 10);
    }

    #[test]
    fn test_swap_remove_revisits_slot() {
        let mut arena: Arena<u32> = (0..6).collect();

        // Drop the even entries with a cursor loop that re-checks the slot.
        let mut i = 0;
        while i < arena.len() {
            if arena[i] % 2 == 0 {
                arena.swap_remove(i);
            } else {
                i += 1;
            }
        }

        let mut left: Vec<u32> = arena.iter().copied().collect();
        left.sort_unstable();
        assert_eq!(left, vec![1, 3, 5]);
    }

    #[test]
    fn test_swap_remove_breaks_order() {
        let mut arena: Arena<char> = "abcd".chars().collect();
        assert_eq!(arena.swap_remove(0), 'a');
        assert_eq!(arena.as_slice(), &['d', 'b', 'c']);
    }

    #[test]
    fn test_clear_keeps_allocation() {
        let mut arena: Arena<u64> = (0..100).collect();
        let capacity = arena.capacity();
        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.capacity(), capacity);
    }

    #[test]
    fn test_append_and_push_unique() {
        let mut a: Arena<u8> = [1, 2].into_iter().collect();
        let b: Arena<u8> = [3, 4, 5].into_iter().collect();
        a.append(&b);
        assert_eq!(a.as_slice(), &[1, 2, 3, 4, 5]);

        assert_eq!(a.push_unique(3), 2);
        assert_eq!(a.push_unique(9), 5);
        assert_eq!(a.len(), 6);
    }

    #[test]
    fn test_replace() {
        let mut arena: Arena<&str> = ["x", "y"].into_iter().collect();
        assert_eq!(arena.replace(1, "z"), "y");
        assert_eq!(arena.last(), Some(&"z"));
    }
}
