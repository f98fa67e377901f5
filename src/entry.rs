//! Entry API for `StepMap`.
//!
//! `entry` runs the lookup once and hands back where the key lives (or the
//! exact bucket a new entry must go to), so add-or-find, conditional
//! deletes and deferred inserts all skip the second lookup.

use std::hash::{BuildHasher, Hash};
use std::mem;

use crate::map::{Position, StepMap};
use crate::rehash::Hooks;

/// A view into a single entry in a map, which may either be vacant or
/// occupied.
pub enum Entry<'a, K, V, S, H: Hooks> {
    Occupied(OccupiedEntry<'a, K, V, S, H>),
    Vacant(VacantEntry<'a, K, V, S, H>),
}

/// A view into an occupied entry in a `StepMap`.
///
/// While this exists the map cannot move the entry, so deciding on the
/// entry's contents and then removing it costs no second lookup.
pub struct OccupiedEntry<'a, K, V, S, H: Hooks> {
    map: &'a mut StepMap<K, V, S, H>,
    key: K,
    table: usize,
    bucket: usize,
}

/// A view into a vacant entry in a `StepMap`, holding the bucket the key
/// will be inserted into.
pub struct VacantEntry<'a, K, V, S, H: Hooks> {
    map: &'a mut StepMap<K, V, S, H>,
    key: K,
    bucket: usize,
}

impl<K, V, S, H> StepMap<K, V, S, H>
where
    K: Eq + Hash,
    S: BuildHasher,
    H: Hooks,
{
    /// Gets the given key's corresponding entry in the map for in-place
    /// manipulation.
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, S, H> {
        let hash = self.hash_of(&key);
        match self.find_position(hash, &key) {
            Position::Found { table, bucket } => Entry::Occupied(OccupiedEntry {
                map: self,
                key,
                table,
                bucket,
            }),
            Position::Vacant { bucket } => Entry::Vacant(VacantEntry {
                map: self,
                key,
                bucket,
            }),
        }
    }
}

impl<'a, K, V, S, H> Entry<'a, K, V, S, H>
where
    K: Eq + Hash,
    S: BuildHasher,
    H: Hooks,
{
    /// Returns a reference to this entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }

    /// Ensures a value is in the entry by inserting the default if empty,
    /// and returns a mutable reference to the value in the entry.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Ensures a value is in the entry by inserting the result of the
    /// default function if empty, and returns a mutable reference to the
    /// value in the entry.
    pub fn or_insert_with<F: FnOnce() -> V>(self, default: F) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Like [`or_insert_with`](Entry::or_insert_with), passing the key to
    /// the default function.
    pub fn or_insert_with_key<F: FnOnce(&K) -> V>(self, default: F) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let value = default(entry.key());
                entry.insert(value)
            }
        }
    }

    /// Provides in-place mutable access to an occupied entry before any
    /// potential inserts into the map.
    pub fn and_modify<F: FnOnce(&mut V)>(mut self, f: F) -> Self {
        if let Entry::Occupied(entry) = &mut self {
            f(entry.get_mut());
        }
        self
    }
}

impl<'a, K, V, S, H> Entry<'a, K, V, S, H>
where
    K: Eq + Hash,
    V: Default,
    S: BuildHasher,
    H: Hooks,
{
    /// Ensures a value is in the entry by inserting the default value if
    /// empty, and returns a mutable reference to the value in the entry.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(V::default)
    }
}

impl<'a, K, V, S, H> OccupiedEntry<'a, K, V, S, H>
where
    K: Eq + Hash,
    S: BuildHasher,
    H: Hooks,
{
    /// Gets a reference to the key in the entry.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        self.map.tables[self.table].slots[self.bucket]
            .get(&self.key)
            .map(|(_, v)| v)
            .expect("OccupiedEntry: key not found")
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        self.map.tables[self.table].slots[self.bucket]
            .get_mut(&self.key)
            .expect("OccupiedEntry: key not found")
    }

    /// Converts the entry into a mutable reference to its value.
    pub fn into_mut(self) -> &'a mut V {
        self.map.tables[self.table].slots[self.bucket]
            .get_mut(&self.key)
            .expect("OccupiedEntry: key not found")
    }

    /// Sets the value of the entry, and returns the entry's old value.
    pub fn insert(&mut self, value: V) -> V {
        mem::replace(self.get_mut(), value)
    }

    /// Unlinks the entry, returning its value.
    pub fn remove(self) -> V {
        self.remove_entry().1
    }

    /// Unlinks the entry, returning the stored key and value.
    pub fn remove_entry(self) -> (K, V) {
        let OccupiedEntry {
            map,
            key,
            table,
            bucket,
        } = self;
        let removed = map.tables[table].slots[bucket]
            .remove(&key)
            .expect("OccupiedEntry: key not found");
        map.tables[table].used -= 1;
        map.shrink_if_auto_allowed();
        removed
    }

    /// Replaces the stored key with the key this entry was looked up with,
    /// returning the stored one. Useful when `Eq`-equal keys carry
    /// different payloads.
    pub fn replace_key(self) -> K {
        let OccupiedEntry {
            map,
            key,
            table,
            bucket,
        } = self;
        let stored = map.tables[table].slots[bucket]
            .key_mut(&key)
            .expect("OccupiedEntry: key not found");
        mem::replace(stored, key)
    }
}

impl<'a, K, V, S, H> VacantEntry<'a, K, V, S, H>
where
    K: Eq + Hash,
    S: BuildHasher,
    H: Hooks,
{
    /// Gets a reference to the key that would be used when inserting.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes ownership of the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts the entry at the bucket the lookup pinned down, and returns
    /// a mutable reference to its value.
    pub fn insert(self, value: V) -> &'a mut V {
        self.map.insert_at(self.bucket, self.key, value)
    }
}
