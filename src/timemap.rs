// Basis Tracker
// Written in 2025 by
//   the Basis Tracker developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! Time Map
//!
//! An ordered set of elements, indexed by timestamp but where duplicate
//! timestamps are allowed (in which case the first-inserted ones will come
//! first).
//!
//! Supports iteration and popping from either end, plus an O(n)
//! maximal-element pop, but otherwise does not support direct indexing
//! or random access.
//!

use crate::units::UtcTime;
use std::collections::{btree_map, BTreeMap};
use std::iter;

/// A time-indexed map
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct TimeMap<V> {
    map: BTreeMap<(UtcTime, u64), V>,
    next_idx: u64,
}

// Cannot be derived because the #derive logic is dumb and wants a
// Default bound on V even though we do not need one
impl<V> Default for TimeMap<V> {
    fn default() -> Self {
        TimeMap {
            map: Default::default(),
            next_idx: 0,
        }
    }
}

impl<V> TimeMap<V> {
    /// Constructs a new empty time map
    pub fn new() -> Self {
        Default::default()
    }

    /// Computes the number of stored entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether or not the map is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Pops the earliest element from the map, if one exists
    pub fn pop_first(&mut self) -> Option<(UtcTime, V)> {
        let first_key = self.map.keys().next().copied();
        let value = first_key.and_then(|key| self.map.remove(&key));
        first_key.map(|key| (key.0, value.unwrap()))
    }

    /// Pops the latest element from the map, if one exists
    ///
    /// Among entries sharing the final timestamp, the last-inserted
    /// one comes out first.
    pub fn pop_last(&mut self) -> Option<(UtcTime, V)> {
        let last_key = self.map.keys().next_back().copied();
        let value = last_key.and_then(|key| self.map.remove(&key));
        last_key.map(|key| (key.0, value.unwrap()))
    }

    /// Pops the maximal element from the map, according to some maximization function
    ///
    /// Ties are broken toward the earliest entry. Unlike `pop_first`
    /// this function is O(n), and if you are using it heavily, it may
    /// make sense to change data structures.
    pub fn pop_max<F, T>(&mut self, mut maxfn: F) -> Option<(UtcTime, V)>
    where
        F: FnMut(&V) -> T,
        T: Ord,
    {
        let mut max_key_val = None;
        for (k, v) in &self.map {
            let new_max = maxfn(v);
            if let Some((ref mut key, ref mut max)) = max_key_val {
                if new_max > *max {
                    *key = *k;
                    *max = new_max;
                }
            } else {
                max_key_val = Some((*k, new_max));
            }
        }
        max_key_val.and_then(|(key, _)| self.map.remove(&key).map(|v| (key.0, v)))
    }

    /// Inserts a new element. Allows duplicates.
    ///
    /// There is no way to replace or delete an element once it is added to the
    /// time map. If you insert an element twice, even with the same timestamp,
    /// it will just be in the map twice.
    pub fn insert(&mut self, time: UtcTime, item: V) {
        let idx = self.next_idx;
        // If this assertion fails it means we somehow used `idx` twice
        assert!(self.map.insert((time, idx), item).is_none());
        self.next_idx += 1;
    }

    /// Returns the most recent element whose timestamp is prior to the given timestamp
    pub fn most_recent(&self, as_of: UtcTime) -> Option<(UtcTime, &V)> {
        self.map
            .range(..(as_of, 0))
            .next_back()
            .map(|((k, _), v)| (*k, v))
    }

    /// Constructs a borrowed iterator over the (time, value) pairs
    pub fn iter(&self) -> Iter<V> {
        Iter {
            iter: self.map.iter(),
        }
    }

    /// Constructs a borrowed iterator over values in the map
    pub fn values(&self) -> Values<V> {
        Values {
            iter: self.map.values(),
        }
    }
}

// Iterators

/// Borrowed iterator over entries
pub struct Values<'a, V> {
    iter: btree_map::Values<'a, (UtcTime, u64), V>,
}
impl<'a, V> Iterator for Values<'a, V> {
    type Item = &'a V;
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// Borrowed iterator over (timestamp, entry) pairs
pub struct Iter<'a, V> {
    iter: btree_map::Iter<'a, (UtcTime, u64), V>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (UtcTime, &'a V);
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|((time, _), v)| (*time, v))
    }
}

impl<'a, V> iter::IntoIterator for &'a TimeMap<V> {
    type Item = (UtcTime, &'a V);
    type IntoIter = Iter<'a, V>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Owned iterator over (timestamp, entry) pairs
pub struct IntoIter<V> {
    iter: btree_map::IntoIter<(UtcTime, u64), V>,
}

impl<V> Iterator for IntoIter<V> {
    type Item = (UtcTime, V);
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|((time, _), v)| (time, v))
    }
}

impl<V> iter::IntoIterator for TimeMap<V> {
    type Item = (UtcTime, V);
    type IntoIter = IntoIter<V>;
    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            iter: self.map.into_iter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(n: i64) -> UtcTime {
        UtcTime::from_unix_i64(n).unwrap()
    }

    #[test]
    fn duplicate_timestamps_keep_insertion_order() {
        let mut map = TimeMap::new();
        map.insert(t(100), "a");
        map.insert(t(100), "b");
        map.insert(t(50), "c");

        assert_eq!(map.pop_first(), Some((t(50), "c")));
        assert_eq!(map.pop_first(), Some((t(100), "a")));
        assert_eq!(map.pop_first(), Some((t(100), "b")));
        assert_eq!(map.pop_first(), None);
    }

    #[test]
    fn pop_last_reverses() {
        let mut map = TimeMap::new();
        map.insert(t(100), "a");
        map.insert(t(200), "b");
        map.insert(t(200), "c");

        assert_eq!(map.pop_last(), Some((t(200), "c")));
        assert_eq!(map.pop_last(), Some((t(200), "b")));
        assert_eq!(map.pop_last(), Some((t(100), "a")));
    }

    #[test]
    fn pop_max_ties_break_earliest() {
        let mut map = TimeMap::new();
        map.insert(t(100), 7u32);
        map.insert(t(50), 7u32);
        map.insert(t(200), 3u32);

        // strictly-greater comparison means the earliest 7 wins
        assert_eq!(map.pop_max(|v| *v), Some((t(50), 7)));
        assert_eq!(map.pop_max(|v| *v), Some((t(100), 7)));
        assert_eq!(map.pop_max(|v| *v), Some((t(200), 3)));
    }

    #[test]
    fn most_recent_is_strictly_prior() {
        let mut map = TimeMap::new();
        map.insert(t(100), "a");
        map.insert(t(200), "b");

        assert_eq!(map.most_recent(t(100)), None);
        assert_eq!(map.most_recent(t(101)), Some((t(100), &"a")));
        assert_eq!(map.most_recent(t(500)), Some((t(200), &"b")));
    }
}
