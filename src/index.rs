//! The index facade: owns the collaborators (hasher, key/value codecs,
//! metrics sink, page cache) and the single [`RwGuarded`] latch that
//! serializes access to [`Inner`] — one writer or many readers, never
//! both.
//!
//! A thin struct that owns configuration plus one lock around the
//! mutable core, exposing `get`/`put`/`remove` and forwarding everything
//! else to the collaborator that actually does the work. Generics here
//! stop at `<K, V, C: PageCache>` rather than threading a hasher/codec/
//! metrics type parameter through every method: those collaborators are
//! all already object-safe, so a `Box<dyn _>` field avoids a
//! combinatorial explosion of type parameters for no behavioral gain.

use std::collections::HashMap;

use crate::{
    cache::PageCache,
    codec::Codec,
    directory::{BucketPointer, Directory},
    engine::{self, Inner},
    err_at,
    error::Result,
    guard::RwGuarded,
    hash::KeyHasher,
    lock::Stats,
    metrics::Metrics,
    options::{IndexOptions, PersistedOptions},
    split_buffer::SplitBuffer,
    state,
    store::BucketStore,
};

/// Structural counters returned by [`HashIndex::stats`], analogous to
/// `robt::Stats`: enough to tell whether the directory is growing the
/// way a caller expects without reaching into its internals.
#[derive(Debug, Clone)]
pub struct IndexStats {
    /// Live entry count (`recordsCount`).
    pub records_count: u64,
    /// Live directory node count.
    pub node_count: u64,
    /// Live bucket count per file level; level 0 is the original seed,
    /// level N the Nth generation of split-off pages.
    pub buckets_per_level: HashMap<u8, u64>,
    /// Tombstoned (freed, reusable) bucket-page count per file level.
    pub tombstones_per_level: HashMap<u8, u64>,
    /// The RW-lock's own read/write/conflict counters.
    pub lock_stats: Stats,
}

/// A durable extendible-hash index over `(K, V)` pairs, backed by a page
/// cache `C`.
pub struct HashIndex<K, V, C: PageCache> {
    options: IndexOptions,
    hasher: Box<dyn KeyHasher<K> + Send + Sync>,
    kc: Box<dyn Codec<K> + Send + Sync>,
    vc: Box<dyn Codec<V> + Send + Sync>,
    metrics: Box<dyn Metrics + Send + Sync>,
    state: RwGuarded<Inner<K, V, C>>,
}

impl<K, V, C> HashIndex<K, V, C>
where
    K: Ord + Clone,
    V: Clone,
    C: PageCache,
{
    /// Build a fresh index: seed `max_level_size` empty buckets at file
    /// level 0 and route every hash to one of them through a single root
    /// directory node.
    pub fn create(
        options: IndexOptions,
        cache: C,
        hasher: Box<dyn KeyHasher<K> + Send + Sync>,
        kc: Box<dyn Codec<K> + Send + Sync>,
        vc: Box<dyn Codec<V> + Send + Sync>,
        metrics: Box<dyn Metrics + Send + Sync>,
    ) -> Result<HashIndex<K, V, C>> {
        let n_buckets = options.max_level_size as u64;
        let pointers: Vec<BucketPointer> = (0..n_buckets)
            .map(|i| BucketPointer { page_index: i, file_level: 0 })
            .collect();
        let directory = Directory::new(options.max_level_depth, pointers);

        let mut store = BucketStore::new(cache, options.max_bucket_size_bytes);
        store.seed_level_zero::<K, V>(n_buckets, options.max_level_depth, 1, kc.as_ref(), vc.as_ref())?;

        let inner = Inner::new(directory, store, options.split_buffer_limit);
        Ok(HashIndex {
            options,
            hasher,
            kc,
            vc,
            metrics,
            state: RwGuarded::new(inner),
        })
    }

    /// Reopen a previously [`close`][Self::close]d index, validating that
    /// `options`' persisted-relevant fields match what it was built with
    /// (a mismatched reopen is a configuration error, not a corruption
    /// one).
    pub fn open(
        options: IndexOptions,
        cache: C,
        hasher: Box<dyn KeyHasher<K> + Send + Sync>,
        kc: Box<dyn Codec<K> + Send + Sync>,
        vc: Box<dyn Codec<V> + Send + Sync>,
        metrics: Box<dyn Metrics + Send + Sync>,
    ) -> Result<HashIndex<K, V, C>> {
        let dir = options.dir.as_os_str();
        let (records_count, page_size, persisted) = state::load_metadata(dir, &options.name)?;
        let expected = PersistedOptions::from(&options);
        if persisted != expected {
            return err_at!(
                Configuration,
                msg: "reopen options {:?} do not match persisted options {:?}", expected, persisted
            );
        }

        let (_max_level_depth, directory, levels) = state::load_tree_state(dir, &options.name)?;
        let mut store = BucketStore::new(cache, page_size);
        store.restore_levels(levels);

        let inner = Inner {
            directory,
            store,
            split_buffer: SplitBuffer::new(options.split_buffer_limit),
            records_count,
        };
        Ok(HashIndex {
            options,
            hasher,
            kc,
            vc,
            metrics,
            state: RwGuarded::new(inner),
        })
    }

    /// Point lookup by key.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let conflicts_before = self.state.lock_stats().conflicts;
        let guard = self.state.read(self.options.spin_before_park);
        if self.state.lock_stats().conflicts > conflicts_before {
            self.metrics.record_lock_conflict();
        }
        let hash = self.hasher.hash_key(key);
        self.metrics.record_lookup();
        engine::get(&guard, hash, key, self.kc.as_ref(), self.vc.as_ref())
    }

    /// Insert or update, splitting and retrying internally as many times
    /// as the insert requires.
    pub fn put(&self, key: K, value: V) -> Result<()> {
        let conflicts_before = self.state.lock_stats().conflicts;
        let mut guard = self.state.write(self.options.spin_before_park);
        if self.state.lock_stats().conflicts > conflicts_before {
            self.metrics.record_lock_conflict();
        }
        let inner = &mut *guard;
        engine::put(
            inner,
            self.hasher.as_ref(),
            key,
            value,
            &self.options,
            self.metrics.as_ref(),
            self.kc.as_ref(),
            self.vc.as_ref(),
        )
    }

    /// Remove by key. Returns `true` if `key` was present.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let conflicts_before = self.state.lock_stats().conflicts;
        let mut guard = self.state.write(self.options.spin_before_park);
        if self.state.lock_stats().conflicts > conflicts_before {
            self.metrics.record_lock_conflict();
        }
        let inner = &mut *guard;
        engine::remove(
            inner,
            self.hasher.as_ref(),
            key,
            &self.options,
            self.metrics.as_ref(),
            self.kc.as_ref(),
            self.vc.as_ref(),
        )
    }

    /// Every entry strictly after `key`, in hash-prefix then key order.
    pub fn higher_entries(&self, key: &K) -> Result<Vec<(K, V)>> {
        let guard = self.state.read(self.options.spin_before_park);
        let hash = self.hasher.hash_key(key);
        engine::higher_entries(&guard, key, hash, self.kc.as_ref(), self.vc.as_ref())
    }

    /// `key` if present, else the entries after it.
    pub fn ceiling_entries(&self, key: &K) -> Result<Vec<(K, V)>> {
        let guard = self.state.read(self.options.spin_before_park);
        let hash = self.hasher.hash_key(key);
        engine::ceiling_entries(&guard, key, hash, self.kc.as_ref(), self.vc.as_ref())
    }

    /// Every entry strictly before `key`, walking backward in
    /// hash-prefix order.
    pub fn lower_entries(&self, key: &K) -> Result<Vec<(K, V)>> {
        let guard = self.state.read(self.options.spin_before_park);
        let hash = self.hasher.hash_key(key);
        engine::lower_entries(&guard, key, hash, self.kc.as_ref(), self.vc.as_ref())
    }

    /// `key` if present, else the nearest entry before it, walking
    /// backward in hash-prefix order.
    pub fn floor_entries(&self, key: &K) -> Result<Vec<(K, V)>> {
        let guard = self.state.read(self.options.spin_before_park);
        let hash = self.hasher.hash_key(key);
        engine::floor_entries(&guard, key, hash, self.kc.as_ref(), self.vc.as_ref())
    }

    /// Number of live records.
    pub fn len(&self) -> u64 {
        let guard = self.state.read(self.options.spin_before_park);
        guard.records_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time read/write-lock counters, for diagnostics.
    pub fn lock_stats(&self) -> Stats {
        self.state.lock_stats()
    }

    /// A snapshot of structural counters, analogous to a storage engine's
    /// own `Stats` type: entry count, live node/bucket counts, tombstone
    /// chain lengths per file level, and the RW-lock's own counters.
    pub fn stats(&self) -> Result<IndexStats> {
        let guard = self.state.read(self.options.spin_before_park);
        let levels = guard.store.snapshot_levels();
        let mut tombstones_per_level = HashMap::with_capacity(levels.len());
        for &level in levels.keys() {
            let len = guard.store.tombstone_chain_len(level, self.kc.as_ref(), self.vc.as_ref())?;
            tombstones_per_level.insert(level, len);
        }
        Ok(IndexStats {
            records_count: guard.records_count,
            node_count: guard.directory.live_node_count(),
            buckets_per_level: levels.into_iter().map(|(level, (count, _))| (level, count)).collect(),
            tombstones_per_level,
            lock_stats: self.state.lock_stats(),
        })
    }

    /// Flush every buffered split page and the per-level bucket files,
    /// then persist the directory and bucket-store bookkeeping so a later
    /// [`open`][Self::open] can rebuild them exactly.
    pub fn close(self) -> Result<()> {
        let mut guard = self.state.write(self.options.spin_before_park);
        let inner = &mut *guard;

        if !inner.split_buffer.is_empty() {
            inner.split_buffer.drain(&inner.store, self.kc.as_ref(), self.vc.as_ref())?;
        }
        let levels: HashMap<u8, (u64, i64)> = inner.store.snapshot_levels();
        for level in levels.keys() {
            inner.store.flush(*level)?;
        }

        let dir = self.options.dir.as_os_str();
        state::save_metadata(
            dir,
            &self.options.name,
            inner.records_count,
            inner.store.page_size(),
            &PersistedOptions::from(&self.options),
        )?;
        state::save_tree_state(dir, &self.options.name, self.options.max_level_depth, &inner.directory, &levels)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;

#[cfg(test)]
#[path = "index_model_test.rs"]
mod index_model_test;

#[cfg(test)]
#[path = "index_concurrency_test.rs"]
mod index_concurrency_test;
