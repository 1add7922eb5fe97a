//! A sorted collection of disjoint intervals.

use crate::interval::Interval;
use smallvec::{smallvec, SmallVec};
use std::slice;

/// A set of intervals of one kind, kept sorted by [`Interval::sort_key`].
///
/// The stored intervals never overlap, and no two of them can be merged: whenever an interval is
/// added, it absorbs every stored interval that it can merge with. Stored intervals that overlap
/// an added interval without being mergeable are carved up so that only the parts outside of it
/// remain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntervalSet<I> {
    intervals: Vec<I>,
}

impl<I: Interval> IntervalSet<I> {
    /// Creates a new empty `IntervalSet`.
    #[inline]
    pub const fn new() -> Self {
        IntervalSet {
            intervals: Vec::new(),
        }
    }

    /// Creates a new `IntervalSet` containing only `interval`.
    #[inline]
    pub fn from_interval(interval: I) -> Self {
        let mut set = Self::new();
        set.add(interval);

        set
    }

    /// Returns the stored intervals, sorted by their start.
    #[inline]
    pub fn intervals(&self) -> &[I] {
        &self.intervals
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, I> {
        self.intervals.iter()
    }

    /// Returns the number of stored intervals.
    #[inline]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Alias for [`len`](Self::len).
    #[inline]
    pub fn size(&self) -> usize {
        self.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Alias for [`is_empty`](Self::is_empty).
    #[inline]
    pub fn empty(&self) -> bool {
        self.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.intervals.clear();
    }

    /// Adds `interval` to the set.
    ///
    /// Empty intervals are ignored.
    pub fn add(&mut self, interval: I) {
        if interval.is_empty() {
            return;
        }

        let mut pending: SmallVec<[I; 4]> = smallvec![interval];

        while let Some(mut current) = pending.pop() {
            'merge: loop {
                for index in I::candidates(&self.intervals, &current) {
                    let stored = self.intervals[index];

                    if let Some(merged) = current.merge(&stored) {
                        self.intervals.remove(index);
                        current = merged;

                        continue 'merge;
                    }

                    if current.overlaps(&stored) {
                        self.intervals.remove(index);
                        pending.extend(stored.difference(&current));

                        continue 'merge;
                    }
                }

                break;
            }

            let key = current.sort_key();
            let index = self
                .intervals
                .partition_point(|interval| interval.sort_key() < key);
            self.intervals.insert(index, current);
        }
    }

    /// Removes `interval` from the set. Stored intervals that are partially covered by
    /// `interval` are shrunk or split.
    pub fn remove(&mut self, interval: I) {
        if interval.is_empty() {
            return;
        }

        let window = I::candidates(&self.intervals, &interval);
        let mut leftovers: SmallVec<[I; 8]> = SmallVec::new();
        let mut index = window.start;
        let mut end = window.end;

        while index < end {
            if self.intervals[index].overlaps(&interval) {
                let stored = self.intervals.remove(index);
                leftovers.extend(stored.difference(&interval));
                end -= 1;
            } else {
                index += 1;
            }
        }

        for piece in leftovers {
            self.add(piece);
        }
    }

    /// Returns an iterator over the stored intervals that overlap `query`.
    pub fn find_overlapping(&self, query: &I) -> impl Iterator<Item = &I> + '_ {
        let query = *query;
        let window = I::candidates(&self.intervals, &query);

        self.intervals[window]
            .iter()
            .filter(move |interval| interval.overlaps(&query))
    }

    /// Returns `true` if any stored interval overlaps `query`.
    #[inline]
    pub fn has_overlap(&self, query: &I) -> bool {
        self.find_overlapping(query).next().is_some()
    }

    /// Returns `true` if every part of `interval` is covered by the set.
    ///
    /// Empty intervals are never covered.
    pub fn covers(&self, interval: &I) -> bool {
        if interval.is_empty() {
            return false;
        }

        let mut uncovered = IntervalSet::from_interval(*interval);

        for stored in self.find_overlapping(interval) {
            uncovered.remove(*stored);
        }

        uncovered.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        for interval in &self.intervals {
            assert!(!interval.is_empty(), "{:?} is empty", interval);
        }

        for pair in self.intervals.windows(2) {
            assert!(
                pair[0].sort_key() <= pair[1].sort_key(),
                "{:?} is not sorted",
                self.intervals,
            );
        }

        for (i, a) in self.intervals.iter().enumerate() {
            for b in &self.intervals[i + 1..] {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
                assert!(a.merge(b).is_none(), "{:?} can merge with {:?}", a, b);
            }
        }
    }
}

impl<I: Interval> Default for IntervalSet<I> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Interval> From<I> for IntervalSet<I> {
    #[inline]
    fn from(interval: I) -> Self {
        Self::from_interval(interval)
    }
}

impl<I: Interval> FromIterator<I> for IntervalSet<I> {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        let mut set = Self::new();

        for interval in iter {
            set.add(interval);
        }

        set
    }
}

impl<'a, I> IntoIterator for &'a IntervalSet<I> {
    type Item = &'a I;
    type IntoIter = slice::Iter<'a, I>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}
