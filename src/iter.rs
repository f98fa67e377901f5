//! Iterators for `StepMap`.
//!
//! Two live flavours: the default one holds the rehash pause for its whole
//! lifetime, the unguarded one instead records a structural fingerprint and
//! panics on drop if the map changed under it. Both walk the drained prefix
//! of the first table only once a migration is underway.

use std::cell::Cell;
use std::mem;
use std::slice;

use crate::map::{StepMap, Table};
use crate::node::{Link, Node};
use crate::rehash::Hooks;

/// An iterator over the entries of a `StepMap`, pausing rehash while alive.
pub struct Iter<'a, K, V> {
    t0: slice::Iter<'a, Link<K, V>>,
    t1: slice::Iter<'a, Link<K, V>>,
    chain: Option<&'a Link<K, V>>,
    pause: &'a Cell<u32>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.chain.take() {
                Some(Link::Key(k, v)) => return Some((k, v)),
                Some(Link::Node(node)) => {
                    // Hold the next hop before yielding the current entry.
                    if !node.next.is_empty() {
                        self.chain = Some(&node.next);
                    }
                    return Some((&node.key, &node.val));
                }
                Some(Link::Empty) | None => {
                    let slot = self.t0.next().or_else(|| self.t1.next())?;
                    if !slot.is_empty() {
                        self.chain = Some(slot);
                    }
                }
            }
        }
    }
}

impl<'a, K, V> Drop for Iter<'a, K, V> {
    fn drop(&mut self) {
        self.pause.set(self.pause.get() - 1);
    }
}

/// An iterator that does not pause rehash; instead it snapshots the map's
/// fingerprint and panics on drop if anything structural changed while it
/// was alive. A debugging trap, not a protection.
pub struct IterUnguarded<'a, K, V, S, H: Hooks> {
    map: &'a StepMap<K, V, S, H>,
    t0: slice::Iter<'a, Link<K, V>>,
    t1: slice::Iter<'a, Link<K, V>>,
    chain: Option<&'a Link<K, V>>,
    fingerprint: u64,
}

impl<'a, K, V, S, H: Hooks> Iterator for IterUnguarded<'a, K, V, S, H> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.chain.take() {
                Some(Link::Key(k, v)) => return Some((k, v)),
                Some(Link::Node(node)) => {
                    if !node.next.is_empty() {
                        self.chain = Some(&node.next);
                    }
                    return Some((&node.key, &node.val));
                }
                Some(Link::Empty) | None => {
                    let slot = self.t0.next().or_else(|| self.t1.next())?;
                    if !slot.is_empty() {
                        self.chain = Some(slot);
                    }
                }
            }
        }
    }
}

impl<'a, K, V, S, H: Hooks> Drop for IterUnguarded<'a, K, V, S, H> {
    fn drop(&mut self) {
        assert_eq!(
            self.fingerprint,
            self.map.fingerprint(),
            "map mutated during unguarded iteration"
        );
    }
}

/// A mutable iterator over the entries of a `StepMap`.
pub struct IterMut<'a, K, V> {
    t0: slice::IterMut<'a, Link<K, V>>,
    t1: slice::IterMut<'a, Link<K, V>>,
    chain: Option<&'a mut Link<K, V>>,
    pause: &'a Cell<u32>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.chain.take() {
                Some(Link::Key(k, v)) => return Some((&*k, v)),
                Some(Link::Node(node)) => {
                    let Node { key, val, next } = &mut **node;
                    if !next.is_empty() {
                        self.chain = Some(next);
                    }
                    return Some((&*key, val));
                }
                Some(Link::Empty) | None => {
                    let slot = self.t0.next().or_else(|| self.t1.next())?;
                    if !slot.is_empty() {
                        self.chain = Some(slot);
                    }
                }
            }
        }
    }
}

impl<'a, K, V> Drop for IterMut<'a, K, V> {
    fn drop(&mut self) {
        self.pause.set(self.pause.get() - 1);
    }
}

/// An iterator over the keys of a `StepMap`.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

/// An iterator over the values of a `StepMap`.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

/// A mutable iterator over the values of a `StepMap`.
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

/// An owning iterator over the entries of a `StepMap`.
pub struct IntoIter<K, V> {
    slots: std::iter::Chain<std::vec::IntoIter<Link<K, V>>, std::vec::IntoIter<Link<K, V>>>,
    chain: Link<K, V>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.chain.take() {
                Link::Key(k, v) => return Some((k, v)),
                Link::Node(node) => {
                    let Node { key, val, next } = *node;
                    self.chain = next;
                    return Some((key, val));
                }
                Link::Empty => {
                    self.chain = self.slots.next()?;
                }
            }
        }
    }
}

impl<K, V, S, H: Hooks> StepMap<K, V, S, H> {
    /// First still-populated index of the main table.
    fn scan_floor(&self) -> usize {
        if self.is_rehashing() {
            self.rehash_idx as usize
        } else {
            0
        }
    }

    /// Returns an iterator over all key-value pairs. Rehash migration is
    /// paused until the iterator goes away.
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.rehash_pause.set(self.rehash_pause.get() + 1);
        Iter {
            t0: self.tables[0].slots[self.scan_floor()..].iter(),
            t1: self.tables[1].slots.iter(),
            chain: None,
            pause: &self.rehash_pause,
        }
    }

    /// Returns the fingerprint-checked iterator. See [`IterUnguarded`].
    pub fn iter_unguarded(&self) -> IterUnguarded<'_, K, V, S, H> {
        IterUnguarded {
            map: self,
            t0: self.tables[0].slots[self.scan_floor()..].iter(),
            t1: self.tables[1].slots.iter(),
            chain: None,
            fingerprint: self.fingerprint(),
        }
    }

    /// Returns a mutable iterator over all key-value pairs.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let start = self.scan_floor();
        self.rehash_pause.set(self.rehash_pause.get() + 1);
        let StepMap {
            tables,
            rehash_pause,
            ..
        } = self;
        let [t0, t1] = tables;
        IterMut {
            t0: t0.slots[start..].iter_mut(),
            t1: t1.slots.iter_mut(),
            chain: None,
            pause: rehash_pause,
        }
    }

    /// Returns an iterator over all keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over all values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns a mutable iterator over all values.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }
}

impl<'a, K, V, S, H: Hooks> IntoIterator for &'a StepMap<K, V, S, H> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V, S, H: Hooks> IntoIterator for &'a mut StepMap<K, V, S, H> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}

impl<K, V, S, H: Hooks> IntoIterator for StepMap<K, V, S, H> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(mut self) -> IntoIter<K, V> {
        // The map's drop still reports a synthetic rehash completion if a
        // migration was in flight.
        let [t0, t1] = mem::replace(&mut self.tables, [Table::new(), Table::new()]);
        IntoIter {
            slots: t0.slots.into_iter().chain(t1.slots),
            chain: Link::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn iter_covers_both_tables_mid_rehash() {
        let mut map = StepMap::new();
        for i in 0..=4u64 {
            map.insert(i, i * 2);
        }
        assert!(map.is_rehashing());
        let seen: HashSet<u64> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(seen.len(), 5);
        for i in 0..=4 {
            assert!(seen.contains(&i));
        }
    }

    #[test]
    fn iter_holds_the_rehash_pause() {
        let mut map = StepMap::new();
        for i in 0..10u64 {
            map.insert(i, i);
        }
        {
            let _a = map.iter();
            let _b = map.iter();
            assert_eq!(map.rehash_pause.get(), 2);
        }
        assert_eq!(map.rehash_pause.get(), 0);
    }

    #[test]
    fn iter_mut_updates_every_value() {
        let mut map = StepMap::new();
        for i in 0..50u64 {
            map.insert(i, i);
        }
        for (_, v) in map.iter_mut() {
            *v += 1;
        }
        for i in 0..50 {
            assert_eq!(map.get(&i), Some(&(i + 1)));
        }
    }

    #[test]
    fn keys_and_values_line_up() {
        let mut map = StepMap::new();
        map.insert(1u64, 10u64);
        map.insert(2, 20);
        map.insert(3, 30);
        let keys: Vec<_> = map.keys().copied().collect();
        let values: Vec<_> = map.values().copied().collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(values.len(), 3);
        assert!(keys.contains(&1) && keys.contains(&2) && keys.contains(&3));
        assert!(values.contains(&10) && values.contains(&20) && values.contains(&30));
    }

    #[test]
    fn for_loop_over_borrowed_map() {
        let mut map = StepMap::new();
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);
        let mut sum = 0;
        for (_, v) in &map {
            sum += v;
        }
        assert_eq!(sum, 3);
        for (_, v) in &mut map {
            *v *= 10;
        }
        assert_eq!(map.get("a"), Some(&10));
    }

    #[test]
    fn into_iter_drains_everything() {
        let mut map = StepMap::new();
        for i in 0..100u64 {
            map.insert(i, i);
        }
        let mut pairs: Vec<_> = map.into_iter().collect();
        pairs.sort_unstable();
        assert_eq!(pairs.len(), 100);
        assert_eq!(pairs[0], (0, 0));
        assert_eq!(pairs[99], (99, 99));
    }

    #[test]
    fn unguarded_iter_passes_when_untouched() {
        let mut map = StepMap::new();
        for i in 0..20u64 {
            map.insert(i, i);
        }
        let count = map.iter_unguarded().count();
        assert_eq!(count, 20);
    }

    #[test]
    fn compact_set_iterates_bare_keys() {
        let mut set: StepMap<u64, ()> = StepMap::new().compact_keys();
        for i in 0..10u64 {
            set.try_insert(i, ()).ok();
        }
        let seen: HashSet<u64> = set.keys().copied().collect();
        assert_eq!(seen.len(), 10);
    }
}
