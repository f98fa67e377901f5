//! Resize policy and the incremental rehasher.
//!
//! - Grow at load factor 1, shrink below 1/8 (forced variants at 4 and 1/32)
//! - A resize installs the target table; mutating calls then migrate one or
//!   a few buckets at a time until the source table drains
//! - A process-wide [`ResizeState`] can bias or forbid all of it, the way a
//!   copy-on-write snapshot wants memory to stay put

use std::collections::TryReserveError;
use std::hash::{BuildHasher, Hash};
use std::mem;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use crate::map::{StepMap, Table, INITIAL_NBUCKETS};
use crate::node::{Link, Node};

/// Load factor that forces a grow even in [`ResizeState::Avoid`], and the
/// multiplier on the shrink threshold in the same state.
const FORCE_RESIZE_RATIO: usize = 4;

/// A table shrinks when fewer than one bucket in `MIN_FILL` is used.
const MIN_FILL: usize = 8;

/// Process-wide stance on automatic resizing, shared by every map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeState {
    /// Resize and migrate freely.
    Enabled,
    /// Hold off until the tables are badly out of proportion (4x).
    Avoid,
    /// No resizing, no migration.
    Forbid,
}

static RESIZE_STATE: AtomicU8 = AtomicU8::new(0);

/// Sets the process-wide resize stance.
pub fn set_resize_state(state: ResizeState) {
    RESIZE_STATE.store(state as u8, Ordering::Relaxed);
}

/// Current process-wide resize stance.
pub fn resize_state() -> ResizeState {
    match RESIZE_STATE.load(Ordering::Relaxed) {
        0 => ResizeState::Enabled,
        1 => ResizeState::Avoid,
        _ => ResizeState::Forbid,
    }
}

/// Per-map capabilities a map consults around resizing, plus caller-owned
/// inline metadata. The no-op implementation on `()` is the default.
pub trait Hooks {
    /// Caller data stored inline with the map, built at construction.
    type Metadata: Default;

    /// When `false`, a resize migrates everything immediately instead of
    /// spreading the work over later operations.
    const INCREMENTAL_REHASH: bool = true;

    /// Veto for any grow or shrink about to allocate `new_table_bytes`;
    /// `fill_factor` is the current table's load. Used to refuse
    /// allocations that would push total memory past a limit.
    fn resize_allowed(&self, new_table_bytes: usize, fill_factor: f64) -> bool {
        let _ = (new_table_bytes, fill_factor);
        true
    }

    /// Observes a migration starting (the target table is installed).
    fn rehash_started(&self) {}

    /// Observes a migration finishing (the target became the main table).
    fn rehash_completed(&self) {}
}

impl Hooks for () {
    type Metadata = ();
}

fn alloc_slots<K, V>(len: usize) -> Vec<Link<K, V>> {
    let mut slots = Vec::with_capacity(len);
    slots.resize_with(len, || Link::Empty);
    slots
}

fn try_alloc_slots<K, V>(len: usize) -> Result<Vec<Link<K, V>>, TryReserveError> {
    let mut slots = Vec::new();
    slots.try_reserve_exact(len)?;
    slots.resize_with(len, || Link::Empty);
    Ok(slots)
}

/// Bucket count actually used for a resize to hold `size` elements, or
/// `None` when that overflows the address space.
fn next_table_size<K, V>(size: usize) -> Option<usize> {
    let len = size.max(INITIAL_NBUCKETS).checked_next_power_of_two()?;
    let bytes = len.checked_mul(mem::size_of::<Link<K, V>>())?;
    (bytes <= isize::MAX as usize).then_some(len)
}

impl<K, V, S, H> StepMap<K, V, S, H>
where
    K: Eq + Hash,
    S: BuildHasher,
    H: Hooks,
{
    /// Grows the table to hold at least `size` elements. Returns `false`
    /// when the request is a no-op: already rehashing, `size` not above the
    /// current table, or the rounded size unchanged.
    pub fn expand(&mut self, size: usize) -> bool {
        if self.is_rehashing() || self.tables[0].used > size || self.tables[0].len() >= size {
            return false;
        }
        self.resize(size)
    }

    /// Like [`expand`](StepMap::expand), but reports allocation failure
    /// instead of aborting, leaving the map unchanged.
    pub fn try_expand(&mut self, size: usize) -> Result<bool, TryReserveError> {
        if self.is_rehashing() || self.tables[0].used > size || self.tables[0].len() >= size {
            return Ok(false);
        }
        self.resize_impl(size, true)
    }

    /// Shrinks the table towards `size` elements, never below the initial
    /// size. Returns `false` on a no-op.
    pub fn shrink(&mut self, size: usize) -> bool {
        if self.is_rehashing() || self.tables[0].used > size || self.tables[0].len() <= size {
            return false;
        }
        self.resize(size)
    }

    pub(crate) fn resize(&mut self, size: usize) -> bool {
        // The infallible allocation path cannot report an error.
        self.resize_impl(size, false).unwrap_or(false)
    }

    fn resize_impl(&mut self, size: usize, fallible: bool) -> Result<bool, TryReserveError> {
        assert!(!self.is_rehashing());
        let Some(new_len) = next_table_size::<K, V>(size) else {
            return Ok(false);
        };
        if new_len == self.tables[0].len() {
            return Ok(false);
        }
        let slots = if fallible {
            try_alloc_slots(new_len)?
        } else {
            alloc_slots(new_len)
        };
        self.tables[1] = Table { slots, used: 0 };
        self.rehash_idx = 0;
        self.hooks.rehash_started();

        // First allocation, or an empty source table: nothing to migrate,
        // the new table takes over on the spot.
        if self.tables[0].used == 0 {
            self.hooks.rehash_completed();
            self.tables.swap(0, 1);
            self.tables[1].reset();
            self.rehash_idx = -1;
            return Ok(true);
        }

        if !H::INCREMENTAL_REHASH {
            while self.rehash(1000) {}
        }
        Ok(true)
    }

    /// Migrates at most `n` non-empty buckets, visiting at most `10 * n`
    /// empty ones so a sparse table cannot pin the caller. Returns `true`
    /// while entries remain to move. Paused or forbidden rehashing makes
    /// this a no-op.
    pub fn rehash(&mut self, n: usize) -> bool {
        if !self.is_rehashing() || self.rehash_pause.get() > 0 {
            return false;
        }
        if self.rehash_gated() {
            return false;
        }
        let mut budget = n;
        let mut empty_visits = n * 10;
        while budget > 0 && self.tables[0].used != 0 {
            budget -= 1;
            // The cursor cannot run off the end while entries remain.
            debug_assert!((self.rehash_idx as usize) < self.tables[0].len());
            while self.tables[0].slots[self.rehash_idx as usize].is_empty() {
                self.rehash_idx += 1;
                empty_visits -= 1;
                if empty_visits == 0 {
                    return true;
                }
            }
            let idx = self.rehash_idx as usize;
            self.migrate_bucket(idx);
            self.rehash_idx += 1;
        }
        !self.check_rehash_complete()
    }

    /// Runs 100-step rehash batches until roughly `budget` has elapsed,
    /// returning the number of steps performed. The clock is only checked
    /// between batches, so a bucket is never left half-moved.
    pub fn rehash_for(&mut self, budget: Duration) -> usize {
        if self.rehash_pause.get() > 0 {
            return 0;
        }
        let start = Instant::now();
        let mut steps = 0;
        while self.rehash(100) {
            steps += 100;
            if start.elapsed() >= budget {
                break;
            }
        }
        steps
    }

    /// Source and target table sizes while a migration is in flight.
    pub fn rehashing_info(&self) -> Option<(usize, usize)> {
        self.is_rehashing()
            .then(|| (self.tables[0].len(), self.tables[1].len()))
    }

    /// In the `Avoid` state, migration only proceeds once the two tables
    /// are out of proportion past the forced thresholds.
    fn rehash_gated(&self) -> bool {
        let s0 = self.tables[0].len();
        let s1 = self.tables[1].len();
        match resize_state() {
            ResizeState::Forbid => true,
            ResizeState::Avoid => {
                (s1 > s0 && s1 < FORCE_RESIZE_RATIO * s0)
                    || (s1 < s0 && s0 < MIN_FILL * FORCE_RESIZE_RATIO * s1)
            }
            ResizeState::Enabled => false,
        }
    }

    /// Migrates exactly the bucket at `idx` of the source table. Used by
    /// operations that already touched that bucket, where migrating it is
    /// nearly free cache-wise.
    pub(crate) fn bucket_rehash(&mut self, idx: usize) -> bool {
        if !self.is_rehashing() || self.rehash_pause.get() > 0 || self.rehash_gated() {
            return false;
        }
        self.migrate_bucket(idx);
        self.check_rehash_complete();
        true
    }

    /// Bounded migration increment run by mutating operations: the touched
    /// bucket if it is still pending, otherwise one cursor step.
    pub(crate) fn step_rehash_at(&mut self, hash: u64) {
        if !self.is_rehashing() {
            return;
        }
        let idx = self.tables[0].index(hash);
        if (idx as isize) >= self.rehash_idx && !self.tables[0].slots[idx].is_empty() {
            self.bucket_rehash(idx);
        } else if self.rehash_pause.get() == 0 {
            self.rehash(1);
        }
    }

    /// Relinks every entry of source bucket `idx` into the target table.
    /// Keys are not re-hashed on the shrink path: the smaller mask is a
    /// prefix of the larger, so `idx & new_mask` is the destination. That
    /// only holds for power-of-two size changes.
    fn migrate_bucket(&mut self, idx: usize) {
        let growing = self.tables[1].len() > self.tables[0].len();
        let shrink_mask = self.tables[1].len().wrapping_sub(1);
        let mut chain = self.tables[0].slots[idx].take();
        loop {
            match chain {
                Link::Empty => break,
                // A bare key is always the chain tail.
                Link::Key(key, val) => {
                    let dest = if growing {
                        self.tables[1].index(self.hash_of(&key))
                    } else {
                        idx & shrink_mask
                    };
                    let slot = &mut self.tables[1].slots[dest];
                    let prev = slot.take();
                    *slot = if self.compact && prev.is_empty() {
                        Link::Key(key, val)
                    } else {
                        Link::Node(Box::new(Node {
                            key,
                            val,
                            next: prev,
                        }))
                    };
                    self.tables[0].used -= 1;
                    self.tables[1].used += 1;
                    chain = Link::Empty;
                }
                Link::Node(mut node) => {
                    let rest = node.next.take();
                    let dest = if growing {
                        self.tables[1].index(self.hash_of(&node.key))
                    } else {
                        idx & shrink_mask
                    };
                    let slot = &mut self.tables[1].slots[dest];
                    let prev = slot.take();
                    if self.compact && prev.is_empty() {
                        // Empty destination: the key rides bare in the
                        // slot and the node allocation is reclaimed.
                        let Node { key, val, .. } = *node;
                        *slot = Link::Key(key, val);
                    } else {
                        // Relink the existing record, allocation untouched.
                        node.next = prev;
                        *slot = Link::Node(node);
                    }
                    self.tables[0].used -= 1;
                    self.tables[1].used += 1;
                    chain = rest;
                }
            }
        }
    }

    /// Once the source table drains, the target takes its place.
    pub(crate) fn check_rehash_complete(&mut self) -> bool {
        if self.tables[0].used != 0 {
            return false;
        }
        self.hooks.rehash_completed();
        self.tables.swap(0, 1);
        self.tables[1].reset();
        self.rehash_idx = -1;
        true
    }

    pub(crate) fn expand_if_auto_allowed(&mut self) {
        if self.auto_resize_pause > 0 {
            return;
        }
        self.expand_if_needed();
    }

    pub(crate) fn shrink_if_auto_allowed(&mut self) {
        if self.auto_resize_pause > 0 {
            return;
        }
        self.shrink_if_needed();
    }

    fn expand_if_needed(&mut self) {
        if self.is_rehashing() {
            return;
        }
        if self.tables[0].len() == 0 {
            self.resize(INITIAL_NBUCKETS);
            return;
        }
        let used = self.tables[0].used;
        let size = self.tables[0].len();
        let state = resize_state();
        if (state == ResizeState::Enabled && used >= size)
            || (state != ResizeState::Forbid && used >= FORCE_RESIZE_RATIO * size)
        {
            if self.resize_allowed_for(used + 1) {
                self.expand(used + 1);
            }
        }
    }

    fn shrink_if_needed(&mut self) {
        if self.is_rehashing() || self.tables[0].len() <= INITIAL_NBUCKETS {
            return;
        }
        let used = self.tables[0].used;
        let size = self.tables[0].len();
        let state = resize_state();
        if (state == ResizeState::Enabled && used * MIN_FILL <= size)
            || (state != ResizeState::Forbid && used * MIN_FILL * FORCE_RESIZE_RATIO <= size)
        {
            if self.resize_allowed_for(used) {
                self.shrink(used);
            }
        }
    }

    fn resize_allowed_for(&self, target: usize) -> bool {
        let Some(new_len) = next_table_size::<K, V>(target) else {
            return false;
        };
        let bytes = new_len * mem::size_of::<Link<K, V>>();
        let fill = self.tables[0].used as f64 / self.tables[0].len() as f64;
        self.hooks.resize_allowed(bytes, fill)
    }
}
