//! Seeded SipHash-2-4 hashing.
//!
//! All maps default to SipHash-2-4 keyed by one process-wide 16-byte seed,
//! set once at startup. A case-folding variant covers lookups that must not
//! distinguish ASCII case (the key type's `Eq` has to fold case too).

use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use siphasher::sip::SipHasher24;

static SEED_K0: AtomicU64 = AtomicU64::new(0);
static SEED_K1: AtomicU64 = AtomicU64::new(0);

/// Set the process-wide hash seed. Expected to be called once at startup,
/// before any map is built; re-seeding later invalidates existing maps.
pub fn set_hash_seed(seed: [u8; 16]) {
    let mut half = [0; 8];
    half.copy_from_slice(&seed[..8]);
    SEED_K0.store(u64::from_le_bytes(half), Ordering::Relaxed);
    half.copy_from_slice(&seed[8..]);
    SEED_K1.store(u64::from_le_bytes(half), Ordering::Relaxed);
}

/// Current process-wide hash seed.
pub fn hash_seed() -> [u8; 16] {
    let mut seed = [0; 16];
    seed[..8].copy_from_slice(&SEED_K0.load(Ordering::Relaxed).to_le_bytes());
    seed[8..].copy_from_slice(&SEED_K1.load(Ordering::Relaxed).to_le_bytes());
    seed
}

#[inline]
fn seed_keys() -> (u64, u64) {
    (
        SEED_K0.load(Ordering::Relaxed),
        SEED_K1.load(Ordering::Relaxed),
    )
}

/// `BuildHasher` producing SipHash-2-4 keyed by the process-wide seed.
#[derive(Clone, Copy, Debug, Default)]
pub struct SipState;

impl BuildHasher for SipState {
    type Hasher = SipHasher24;

    #[inline]
    fn build_hasher(&self) -> SipHasher24 {
        let (k0, k1) = seed_keys();
        SipHasher24::new_with_keys(k0, k1)
    }
}

/// Like [`SipState`], but folds ASCII case while hashing, so `"FOO"` and
/// `"foo"` collide on purpose. Pair it with a key type whose `Eq` ignores
/// ASCII case.
#[derive(Clone, Copy, Debug, Default)]
pub struct NocaseSipState;

impl BuildHasher for NocaseSipState {
    type Hasher = NocaseSip;

    #[inline]
    fn build_hasher(&self) -> NocaseSip {
        let (k0, k1) = seed_keys();
        NocaseSip(SipHasher24::new_with_keys(k0, k1))
    }
}

/// Hasher that lowercases every input byte before feeding SipHash.
pub struct NocaseSip(SipHasher24);

impl Hasher for NocaseSip {
    #[inline]
    fn finish(&self) -> u64 {
        self.0.finish()
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0.write_u8(b.to_ascii_lowercase());
        }
    }
}
