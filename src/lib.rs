//! A chained hash map that never stops the world to resize.
//!
//! `StepMap` keeps two bucket tables. Growing or shrinking allocates the
//! target table and then moves one or a few buckets per mutating call until
//! the source drains, so the cost of a resize is spread across the
//! operations that follow it. Lookups search both tables while the
//! migration runs.
//!
//! Besides the map basics it carries the operations a database engine wants
//! from its primary key space: a stateless resize-proof scan cursor, random
//! and bias-corrected sampling, explicit and time-budgeted rehash control,
//! and an entry API that makes add-or-find and inspect-then-delete single
//! lookups.
//!
//! ```
//! use stepmap::StepMap;
//!
//! let mut map = StepMap::new();
//! map.insert("answer", 42);
//! assert_eq!(map.get("answer"), Some(&42));
//!
//! // Work a pending resize off explicitly, 100 buckets at a time.
//! while map.rehash(100) {}
//! ```
//!
//! Hashing defaults to SipHash-2-4 keyed by a process-wide seed
//! ([`set_hash_seed`]), and a process-wide [`ResizeState`] can bias or
//! forbid resizing globally, e.g. while a copy-on-write child is alive.

pub mod entry;
pub mod hash;
pub mod iter;
pub mod map;
mod node;
pub mod rehash;
mod sample;
mod scan;
pub mod stats;

pub use entry::{Entry, OccupiedEntry, VacantEntry};
pub use hash::{hash_seed, set_hash_seed, NocaseSipState, SipState};
pub use iter::{IntoIter, Iter, IterMut, IterUnguarded, Keys, Values, ValuesMut};
pub use map::StepMap;
pub use node::Value;
pub use rehash::{resize_state, set_resize_state, Hooks, ResizeState};
pub use stats::{ChainStats, MapStats, TableStats};
