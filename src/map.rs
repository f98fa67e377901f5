//! Hash map with incremental rehashing.
//!
//! - Two bucket tables: `tables[0]` serves lookups, `tables[1]` is the
//!   rehash target while a resize is being worked off
//! - Mutating operations migrate a bounded amount of pending buckets, so
//!   no single call pays for the whole resize
//! - Collisions are chained; chains are insertion-most-recent-first

use std::borrow::Borrow;
use std::cell::Cell;
use std::hash::{BuildHasher, Hash};
use std::mem;

use crate::hash::SipState;
use crate::node::{Link, Node, Value};
use crate::rehash::Hooks;

/// Smallest bucket count a table is ever allocated or shrunk to.
pub(crate) const INITIAL_NBUCKETS: usize = 4;

/// One bucket array plus its element count.
pub(crate) struct Table<K, V> {
    pub(crate) slots: Vec<Link<K, V>>,
    pub(crate) used: usize,
}

impl<K, V> Table<K, V> {
    pub(crate) const fn new() -> Self {
        Table {
            slots: Vec::new(),
            used: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Bucket index for `hash`. Table sizes are powers of two, so the
    /// low bits of the hash select the bucket.
    #[inline]
    pub(crate) fn index(&self, hash: u64) -> usize {
        debug_assert!(!self.slots.is_empty());
        (hash & (self.slots.len() as u64 - 1)) as usize
    }

    pub(crate) fn reset(&mut self) {
        self.slots = Vec::new();
        self.used = 0;
    }
}

/// Where a key lives, or where it would have to be inserted.
pub(crate) enum Position {
    Found { table: usize, bucket: usize },
    /// Bucket index in the table currently receiving inserts.
    Vacant { bucket: usize },
}

/// A hash map that spreads the cost of growing and shrinking over many
/// small operations.
///
/// `StepMap` keeps two bucket tables. A resize allocates the second table
/// and then migrates one or a few buckets per mutating call until the first
/// table drains, at which point the second takes its place. Lookups search
/// both tables while a migration is in flight.
pub struct StepMap<K, V, S = SipState, H: Hooks = ()> {
    pub(crate) tables: [Table<K, V>; 2],
    /// Next index of `tables[0]` still to migrate; `-1` while idle.
    pub(crate) rehash_idx: isize,
    /// In a `Cell` so read-only iterators can hold the pause.
    pub(crate) rehash_pause: Cell<u32>,
    pub(crate) auto_resize_pause: u32,
    /// Store single-entry buckets as bare keys (no node allocation).
    pub(crate) compact: bool,
    pub(crate) hash_builder: S,
    pub(crate) hooks: H,
    pub(crate) meta: H::Metadata,
}

impl<K, V> StepMap<K, V> {
    /// Creates an empty map. The first bucket table is allocated lazily on
    /// the first insert.
    #[inline]
    pub fn new() -> Self {
        Self::with_hasher(SipState)
    }
}

impl<K: Eq + Hash, V> StepMap<K, V> {
    /// Creates an empty map pre-sized for at least `capacity` elements.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, SipState)
    }
}

impl<K, V, S> StepMap<K, V, S> {
    /// Creates an empty map using the provided hasher.
    #[inline]
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_hasher_and_hooks(hash_builder, ())
    }
}

impl<K, V, S, H: Hooks> StepMap<K, V, S, H> {
    /// Creates an empty map with the provided hasher and hooks.
    pub fn with_hasher_and_hooks(hash_builder: S, hooks: H) -> Self {
        StepMap {
            tables: [Table::new(), Table::new()],
            rehash_idx: -1,
            rehash_pause: Cell::new(0),
            auto_resize_pause: 0,
            compact: false,
            hash_builder,
            hooks,
            meta: H::Metadata::default(),
        }
    }

    /// Returns the number of elements in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.tables[0].used + self.tables[1].used
    }

    /// Returns `true` if the map contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bucket count across both tables.
    #[inline]
    pub fn buckets(&self) -> usize {
        self.tables[0].len() + self.tables[1].len()
    }

    /// Returns `true` while entries are still migrating between tables.
    #[inline]
    pub fn is_rehashing(&self) -> bool {
        self.rehash_idx != -1
    }

    /// Returns a reference to the hasher.
    #[inline]
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns a reference to the hooks.
    #[inline]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Caller-owned metadata stored inline with the map.
    #[inline]
    pub fn metadata(&self) -> &H::Metadata {
        &self.meta
    }

    #[inline]
    pub fn metadata_mut(&mut self) -> &mut H::Metadata {
        &mut self.meta
    }

    /// Blocks all migration work until the matching [`resume_rehash`].
    /// Lookups keep searching both tables correctly while paused.
    ///
    /// [`resume_rehash`]: StepMap::resume_rehash
    pub fn pause_rehash(&mut self) {
        self.rehash_pause.set(self.rehash_pause.get() + 1);
    }

    pub fn resume_rehash(&mut self) {
        let depth = self.rehash_pause.get();
        assert!(depth > 0, "resume_rehash without a matching pause_rehash");
        self.rehash_pause.set(depth - 1);
    }

    /// Suppresses automatic grow/shrink checks. Explicit `expand`/`shrink`
    /// calls still work.
    pub fn pause_auto_resize(&mut self) {
        self.auto_resize_pause += 1;
    }

    pub fn resume_auto_resize(&mut self) {
        assert!(
            self.auto_resize_pause > 0,
            "resume_auto_resize without a matching pause_auto_resize"
        );
        self.auto_resize_pause -= 1;
    }

    /// A 64-bit digest of the map's structural state (table identities,
    /// sizes and element counts). Any mutation that moves entries or
    /// resizes a table changes it; it is the tripwire behind
    /// [`iter_unguarded`](StepMap::iter_unguarded).
    pub fn fingerprint(&self) -> u64 {
        let fields = [
            self.tables[0].slots.as_ptr() as u64,
            self.tables[0].len() as u64,
            self.tables[0].used as u64,
            self.tables[1].slots.as_ptr() as u64,
            self.tables[1].len() as u64,
            self.tables[1].used as u64,
        ];
        // Fold each field into the running digest with Tomas Wang's 64-bit
        // integer mix, so the same fields in a different order disagree.
        let mut hash: u64 = 0;
        for field in fields {
            hash = hash.wrapping_add(field);
            hash = (!hash).wrapping_add(hash << 21);
            hash ^= hash >> 24;
            hash = hash.wrapping_add(hash << 3).wrapping_add(hash << 8);
            hash ^= hash >> 14;
            hash = hash.wrapping_add(hash << 2).wrapping_add(hash << 4);
            hash ^= hash >> 28;
            hash = hash.wrapping_add(hash << 31);
        }
        hash
    }

    /// Approximate heap footprint of the map itself, excluding whatever the
    /// keys and values own: one node per element plus one slot per bucket.
    pub fn mem_usage(&self) -> usize {
        self.len() * mem::size_of::<Node<K, V>>()
            + self.buckets() * mem::size_of::<Link<K, V>>()
    }

    /// Size in bytes of one allocated entry record.
    pub const fn entry_mem_usage() -> usize {
        mem::size_of::<Node<K, V>>()
    }

    /// Removes all elements and resets pause state, keeping hasher, hooks
    /// and metadata.
    pub fn clear(&mut self) {
        if self.is_rehashing() {
            self.hooks.rehash_completed();
        }
        self.tables[0].reset();
        self.tables[1].reset();
        self.rehash_idx = -1;
        self.rehash_pause.set(0);
        self.auto_resize_pause = 0;
    }

    #[inline]
    pub(crate) fn hash_of<Q>(&self, key: &Q) -> u64
    where
        S: BuildHasher,
        Q: Hash + ?Sized,
    {
        self.hash_builder.hash_one(key)
    }
}

impl<K, S, H: Hooks> StepMap<K, (), S, H> {
    /// Switches this (still empty) map to compact key storage: a bucket
    /// holding a single key stores it directly in the slot, with no entry
    /// allocation. Only key-set maps (`V = ()`) can do this, since a bare
    /// slot has no room for a value.
    pub fn compact_keys(mut self) -> Self {
        assert!(
            self.is_empty() && !self.is_rehashing(),
            "compact key storage must be selected before the first insert"
        );
        self.compact = true;
        self
    }
}

impl<K, V, S, H> StepMap<K, V, S, H>
where
    K: Eq + Hash,
    S: BuildHasher,
    H: Hooks,
{
    /// Creates an empty map pre-sized for at least `capacity` elements.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self
    where
        H: Default,
    {
        let mut map = Self::with_hasher_and_hooks(hash_builder, H::default());
        if capacity > 0 {
            map.expand(capacity);
        }
        map
    }

    /// Returns a reference to the value for `key`.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Returns the stored key and value for `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.is_empty() {
            return None;
        }
        let hash = self.hash_of(key);
        let idx0 = self.tables[0].index(hash);
        // Buckets of tables[0] below the cursor are already drained.
        if !(self.is_rehashing() && (idx0 as isize) < self.rehash_idx) {
            if let Some(found) = self.tables[0].slots[idx0].get(key) {
                return Some(found);
            }
        }
        if self.is_rehashing() {
            let idx1 = self.tables[1].index(hash);
            return self.tables[1].slots[idx1].get(key);
        }
        None
    }

    /// Returns `true` if the map contains `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).is_some()
    }

    /// Returns a mutable reference to the value for `key`, working off a
    /// bounded amount of pending migration on the way in.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.is_empty() {
            return None;
        }
        let hash = self.hash_of(key);
        self.step_rehash_at(hash);
        let rehashing = self.is_rehashing();
        let idx0 = self.tables[0].index(hash);
        if !(rehashing && (idx0 as isize) < self.rehash_idx)
            && self.tables[0].slots[idx0].get(key).is_some()
        {
            return self.tables[0].slots[idx0].get_mut(key);
        }
        if rehashing {
            let idx1 = self.tables[1].index(hash);
            return self.tables[1].slots[idx1].get_mut(key);
        }
        None
    }

    /// Inserts a key-value pair, overwriting and returning the previous
    /// value if the key was present. The new value is in place before the
    /// old one is handed back, so reference-counted values survive
    /// re-inserting the same reference.
    pub fn insert(&mut self, key: K, val: V) -> Option<V> {
        let hash = self.hash_of(&key);
        match self.find_position(hash, &key) {
            Position::Found { table, bucket } => {
                let dst = self.tables[table].slots[bucket]
                    .get_mut(&key)
                    .expect("located entry disappeared");
                Some(mem::replace(dst, val))
            }
            Position::Vacant { bucket } => {
                self.insert_at(bucket, key, val);
                None
            }
        }
    }

    /// Inserts only if `key` is absent; otherwise hands the pair back
    /// untouched.
    pub fn try_insert(&mut self, key: K, val: V) -> Result<&mut V, (K, V)> {
        let hash = self.hash_of(&key);
        match self.find_position(hash, &key) {
            Position::Found { .. } => Err((key, val)),
            Position::Vacant { bucket } => Ok(self.insert_at(bucket, key, val)),
        }
    }

    /// Removes `key`, returning its value.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Unlinks `key`, handing back the stored key and value intact.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.is_empty() {
            return None;
        }
        let hash = self.hash_of(key);
        self.step_rehash_at(hash);
        let rehashing = self.is_rehashing();
        let idx0 = self.tables[0].index(hash);
        let mut removed = None;
        if !(rehashing && (idx0 as isize) < self.rehash_idx) {
            removed = self.tables[0].slots[idx0].remove(key);
            if removed.is_some() {
                self.tables[0].used -= 1;
            }
        }
        if removed.is_none() && rehashing {
            let idx1 = self.tables[1].index(hash);
            removed = self.tables[1].slots[idx1].remove(key);
            if removed.is_some() {
                self.tables[1].used -= 1;
            }
        }
        if removed.is_some() {
            self.shrink_if_auto_allowed();
        }
        removed
    }

    /// Keeps only the entries for which `f` returns `true`.
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        for t in 0..2 {
            let start = if t == 0 && self.is_rehashing() {
                self.rehash_idx as usize
            } else {
                0
            };
            let table = &mut self.tables[t];
            let mut removed = 0;
            let start = start.min(table.slots.len());
            for slot in table.slots[start..].iter_mut() {
                removed += slot.retain(&mut f);
            }
            table.used -= removed;
        }
        self.shrink_if_auto_allowed();
    }

    /// Locates `key`, migrating a bounded amount of pending buckets first
    /// and running the auto-expand check, so a vacant result points into
    /// the table currently receiving inserts.
    pub(crate) fn find_position<Q>(&mut self, hash: u64, key: &Q) -> Position
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.step_rehash_at(hash);
        self.expand_if_auto_allowed();
        if self.tables[0].len() == 0 {
            // First table has to exist before anything can be placed, even
            // with auto-resize paused.
            self.resize(INITIAL_NBUCKETS);
        }
        let rehashing = self.is_rehashing();
        let idx0 = self.tables[0].index(hash);
        if !(rehashing && (idx0 as isize) < self.rehash_idx)
            && self.tables[0].slots[idx0].get(key).is_some()
        {
            return Position::Found { table: 0, bucket: idx0 };
        }
        if rehashing {
            let idx1 = self.tables[1].index(hash);
            if self.tables[1].slots[idx1].get(key).is_some() {
                return Position::Found { table: 1, bucket: idx1 };
            }
            return Position::Vacant { bucket: idx1 };
        }
        Position::Vacant { bucket: idx0 }
    }

    /// Installs a new entry at the head of a bucket previously returned by
    /// [`find_position`](StepMap::find_position).
    pub(crate) fn insert_at(&mut self, bucket: usize, key: K, val: V) -> &mut V {
        let t = if self.is_rehashing() { 1 } else { 0 };
        let compact = self.compact;
        let table = &mut self.tables[t];
        assert!(
            bucket < table.len(),
            "insert position does not belong to the receiving table"
        );
        let slot = &mut table.slots[bucket];
        let prev = slot.take();
        if compact && prev.is_empty() {
            *slot = Link::Key(key, val);
        } else {
            *slot = Link::Node(Box::new(Node { key, val, next: prev }));
        }
        table.used += 1;
        match slot {
            Link::Key(_, v) => v,
            Link::Node(node) => &mut node.val,
            Link::Empty => unreachable!(),
        }
    }
}

impl<K, P, S, H> StepMap<K, Value<P>, S, H>
where
    K: Eq + Hash,
    S: BuildHasher,
    H: Hooks,
{
    /// Adds `delta` to the signed counter stored under `key`, returning the
    /// new value. Panics if the stored value is not a signed counter.
    pub fn incr_int<Q>(&mut self, key: &Q, delta: i64) -> Option<i64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_mut(key).map(|v| v.incr_int(delta))
    }

    /// Unsigned counterpart of [`incr_int`](StepMap::incr_int).
    pub fn incr_uint<Q>(&mut self, key: &Q, delta: u64) -> Option<u64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_mut(key).map(|v| v.incr_uint(delta))
    }

    /// Float counterpart of [`incr_int`](StepMap::incr_int).
    pub fn incr_float<Q>(&mut self, key: &Q, delta: f64) -> Option<f64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_mut(key).map(|v| v.incr_float(delta))
    }
}

impl<K, V, S: Default, H: Hooks + Default> Default for StepMap<K, V, S, H> {
    #[inline]
    fn default() -> Self {
        Self::with_hasher_and_hooks(S::default(), H::default())
    }
}

impl<K, V, S, H: Hooks> Drop for StepMap<K, V, S, H> {
    fn drop(&mut self) {
        // Observers watching a rehash get the completion event even when
        // the map goes away mid-migration.
        if self.is_rehashing() {
            self.hooks.rehash_completed();
        }
    }
}
