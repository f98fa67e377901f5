//! Random sampling of entries.
//!
//! `random_entry` is cheap but biased towards long chains; `sample_entries`
//! grabs a batch from a random stretch of the tables; `fair_random_entry`
//! runs the batch sampler and picks one of its results to smooth the
//! chain-length bias away. Each sampler first works off a bounded amount of
//! pending migration, so sample-heavy workloads keep a resize progressing.

use std::hash::{BuildHasher, Hash};

use rand::Rng;

use crate::map::StepMap;
use crate::node::Link;
use crate::rehash::Hooks;

/// Batch size `fair_random_entry` draws before picking one.
const FAIR_RANDOM_SAMPLES: usize = 15;

impl<K, V, S, H> StepMap<K, V, S, H>
where
    K: Eq + Hash,
    S: BuildHasher,
    H: Hooks,
{
    /// Migration work proportional to the sample size about to be drawn.
    fn sample_rehash_work(&mut self, steps: usize) {
        for _ in 0..steps {
            if self.is_rehashing() {
                self.rehash(1);
            } else {
                break;
            }
        }
    }

    /// Returns a uniformly chosen bucket's entry, picking uniformly within
    /// the chain, after one increment of pending migration. Entries on
    /// longer chains are more likely than a truly uniform draw would make
    /// them; good enough for randomized eviction and similar approximate
    /// uses.
    pub fn random_entry<R>(&mut self, rng: &mut R) -> Option<(&K, &V)>
    where
        R: Rng + ?Sized,
    {
        if self.is_rehashing() {
            self.rehash(1);
        }
        self.random_entry_at(rng)
    }

    fn random_entry_at<R>(&self, rng: &mut R) -> Option<(&K, &V)>
    where
        R: Rng + ?Sized,
    {
        if self.is_empty() {
            return None;
        }
        let link = if self.is_rehashing() {
            let s0 = self.tables[0].len() as u64;
            let total = self.buckets() as u64;
            let floor = self.rehash_idx as u64;
            loop {
                // Buckets below the cursor are known empty, so draw from
                // the combined space above it.
                let h = floor + rng.gen_range(0..total - floor);
                let link = if h >= s0 {
                    &self.tables[1].slots[(h - s0) as usize]
                } else {
                    &self.tables[0].slots[h as usize]
                };
                if !link.is_empty() {
                    break link;
                }
            }
        } else {
            loop {
                let h = rng.gen_range(0..self.tables[0].len());
                let link = &self.tables[0].slots[h];
                if !link.is_empty() {
                    break link;
                }
            }
        };
        link.nth(rng.gen_range(0..link.chain_len()))
    }

    /// Collects up to `count` entries starting from a random bucket and
    /// walking both tables linearly, reservoir-sampling within chains so a
    /// long chain's tail is reachable. Works off up to `count` increments
    /// of pending migration first. Makes an effort, not a promise: the
    /// result may be shorter than `count` and may repeat entries. Bails
    /// after `10 * count` buckets; a run of empty buckets longer than
    /// `max(5, count)` makes it jump to a fresh random spot.
    pub fn sample_entries<R>(&mut self, rng: &mut R, count: usize) -> Vec<(&K, &V)>
    where
        R: Rng + ?Sized,
    {
        self.sample_rehash_work(count);
        self.sample_entries_at(rng, count)
    }

    fn sample_entries_at<R>(&self, rng: &mut R, count: usize) -> Vec<(&K, &V)>
    where
        R: Rng + ?Sized,
    {
        let count = count.min(self.len());
        if count == 0 {
            return Vec::new();
        }
        let mut maxsteps = count * 10;
        let tables = if self.is_rehashing() { 2 } else { 1 };
        let mut maxmask = self.tables[0].len() as u64 - 1;
        if tables == 2 {
            maxmask = maxmask.max(self.tables[1].len() as u64 - 1);
        }

        let mut out: Vec<(&K, &V)> = Vec::with_capacity(count);
        let mut stored = 0usize;
        let mut i = rng.gen_range(0..=maxmask);
        let mut emptylen = 0usize;
        while stored < count && maxsteps > 0 {
            maxsteps -= 1;
            for j in 0..tables {
                // The drained prefix of the main table holds nothing; when
                // the cursor is also past the end of the smaller target
                // table, everything below the cursor is a dead zone to skip.
                if tables == 2 && j == 0 && i < self.rehash_idx as u64 {
                    if i >= self.tables[1].len() as u64 {
                        i = self.rehash_idx as u64;
                    } else {
                        continue;
                    }
                }
                if i >= self.tables[j].len() as u64 {
                    continue;
                }
                let link = &self.tables[j].slots[i as usize];
                if link.is_empty() {
                    emptylen += 1;
                    if emptylen >= 5 && emptylen > count {
                        i = rng.gen_range(0..=maxmask);
                        emptylen = 0;
                    }
                } else {
                    emptylen = 0;
                    let mut cur = link;
                    loop {
                        let (k, v, next) = match cur {
                            Link::Empty => break,
                            Link::Key(k, v) => (k, v, None),
                            Link::Node(node) => (&node.key, &node.val, Some(&node.next)),
                        };
                        // First `count` entries always go in; later ones
                        // displace a random earlier pick with probability
                        // count/(stored+1).
                        if stored < count {
                            out.push((k, v));
                        } else {
                            let r = rng.gen_range(0..=stored);
                            if r < count {
                                out[r] = (k, v);
                            }
                        }
                        stored += 1;
                        match next {
                            Some(n) => cur = n,
                            None => break,
                        }
                    }
                    if stored >= count {
                        return out;
                    }
                }
            }
            i = (i + 1) & maxmask;
        }
        out
    }

    /// Random entry with the chain-length bias smoothed out: draws a batch
    /// the way [`sample_entries`](StepMap::sample_entries) does (pending
    /// migration work included) and picks one of it uniformly. Falls back
    /// to a plain random draw when an unlucky batch comes back empty.
    pub fn fair_random_entry<R>(&mut self, rng: &mut R) -> Option<(&K, &V)>
    where
        R: Rng + ?Sized,
    {
        self.sample_rehash_work(FAIR_RANDOM_SAMPLES);
        let samples = self.sample_entries_at(rng, FAIR_RANDOM_SAMPLES);
        if samples.is_empty() {
            return self.random_entry_at(rng);
        }
        Some(samples[rng.gen_range(0..samples.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn filled(n: u64) -> StepMap<u64, u64> {
        let mut map = StepMap::new();
        for i in 0..n {
            map.insert(i, i * 2);
        }
        map
    }

    #[test]
    fn random_entry_on_empty_is_none() {
        let mut map: StepMap<u64, u64> = StepMap::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(map.random_entry(&mut rng).is_none());
        assert!(map.fair_random_entry(&mut rng).is_none());
        assert!(map.sample_entries(&mut rng, 5).is_empty());
    }

    #[test]
    fn random_entry_returns_resident_pairs() {
        let mut map = filled(100);
        let mut rng = StdRng::seed_from_u64(42);
        let mut distinct = std::collections::HashSet::new();
        for _ in 0..200 {
            let (k, v) = map
                .random_entry(&mut rng)
                .map(|(k, v)| (*k, *v))
                .unwrap();
            assert_eq!(map.get(&k), Some(&v));
            distinct.insert(k);
        }
        // 200 draws over 100 keys land on far more than a handful.
        assert!(distinct.len() > 50);
    }

    #[test]
    fn random_entry_works_mid_rehash() {
        let mut map = StepMap::new();
        for i in 0..=16u64 {
            map.insert(i, i);
        }
        assert!(map.is_rehashing());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let k = *map.random_entry(&mut rng).unwrap().0;
            assert!(map.contains_key(&k));
        }
    }

    #[test]
    fn sampling_works_a_pending_migration_off() {
        let mut map = StepMap::new();
        for i in 0..=16u64 {
            map.insert(i, i);
        }
        assert!(map.is_rehashing());
        let mut rng = StdRng::seed_from_u64(11);
        let mut rounds = 0;
        while map.is_rehashing() {
            map.sample_entries(&mut rng, 5);
            rounds += 1;
            assert!(rounds < 100, "sampling never finished the migration");
        }
        assert_eq!(map.len(), 17);
        for i in 0..=16 {
            assert_eq!(map.get(&i), Some(&i));
        }
    }

    #[test]
    fn sample_entries_bounds_and_validity() {
        let mut map = filled(100);
        let mut rng = StdRng::seed_from_u64(3);
        let samples: Vec<(u64, u64)> = map
            .sample_entries(&mut rng, 10)
            .into_iter()
            .map(|(k, v)| (*k, *v))
            .collect();
        assert!(samples.len() <= 10);
        assert!(!samples.is_empty());
        for (k, v) in samples {
            assert_eq!(map.get(&k), Some(&v));
        }
    }

    #[test]
    fn sample_entries_caps_count_at_len() {
        let mut map = filled(3);
        let mut rng = StdRng::seed_from_u64(9);
        let samples = map.sample_entries(&mut rng, 50);
        assert!(samples.len() <= 3);
    }

    #[test]
    fn fair_random_entry_returns_something() {
        let mut map = filled(64);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let k = *map.fair_random_entry(&mut rng).unwrap().0;
            assert!(map.contains_key(&k));
        }
    }
}
