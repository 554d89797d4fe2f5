//! Hash function collaborator: maps a key to a 64-bit unsigned hash,
//! uniformly distributed over the high bits since the directory routes on
//! high bits first. `CityHasher` wraps Google's CityHash via the
//! `cityhash-rs` crate behind `std::hash::{Hasher, BuildHasher}`.

use std::hash::{BuildHasher, Hash, Hasher};

/// Hashes a key into the 64-bit space the directory routes on.
///
/// Implemented for anything that is `Hash` via a `BuildHasher`, so callers
/// can plug in `CityHasher` (the default), `std::collections::hash_map`'s
/// `RandomState`, or a deterministic test hasher.
pub trait KeyHasher<K: ?Sized>: Send + Sync {
    fn hash_key(&self, key: &K) -> u64;
}

impl<K, B> KeyHasher<K> for B
where
    K: Hash + ?Sized,
    B: BuildHasher + Send + Sync,
{
    fn hash_key(&self, key: &K) -> u64 {
        let mut hasher = self.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

/// `BuildHasher` over google's CityHash, via [cityhash-rs][cityhash-rs].
///
/// [cityhash-rs]: https://docs.rs/cityhash-rs
#[derive(Clone, Copy, Default)]
pub struct CityHasher {
    digest: u128,
}

impl CityHasher {
    pub fn new() -> CityHasher {
        CityHasher::default()
    }
}

impl BuildHasher for CityHasher {
    type Hasher = Self;

    #[inline]
    fn build_hasher(&self) -> Self {
        *self
    }
}

impl Hasher for CityHasher {
    fn finish(&self) -> u64 {
        ((self.digest >> 64) as u64) ^ ((self.digest & 0xFFFF_FFFF_FFFF_FFFF) as u64)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.digest = cityhash_rs::cityhash_110_128(bytes);
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
