//! Per-level bucket files, tombstone chains, and page (de)serialization.
//! Every file level beyond 0 is created lazily the first time a bucket
//! splits into it, and carries its own page count and tombstone head.

use std::collections::HashMap;

use crate::{
    bucket::{Bucket, NIL},
    cache::PageCache,
    codec::Codec,
    err_at,
    error::Result,
};

/// Per-level bookkeeping.
#[derive(Clone, Debug, Default)]
struct LevelMeta {
    buckets_count: u64,
    tombstone_index: i64,
}

/// The bucket store: owns level metadata and drives a [`PageCache`] to
/// load and persist [`Bucket`] pages.
pub struct BucketStore<C: PageCache> {
    cache: C,
    page_size: usize,
    levels: HashMap<u8, LevelMeta>,
}

impl<C: PageCache> BucketStore<C> {
    pub fn new(cache: C, page_size: usize) -> BucketStore<C> {
        BucketStore {
            cache,
            page_size,
            levels: HashMap::new(),
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Rebuild level bookkeeping from a persisted snapshot.
    pub fn restore_levels(&mut self, levels: HashMap<u8, (u64, i64)>) {
        self.levels = levels
            .into_iter()
            .map(|(level, (buckets_count, tombstone_index))| {
                (level, LevelMeta { buckets_count, tombstone_index })
            })
            .collect();
    }

    /// Snapshot level bookkeeping for persistence.
    pub fn snapshot_levels(&self) -> HashMap<u8, (u64, i64)> {
        self.levels
            .iter()
            .map(|(level, meta)| (*level, (meta.buckets_count, meta.tombstone_index)))
            .collect()
    }

    pub fn buckets_count(&self, level: u8) -> u64 {
        self.levels.get(&level).map(|m| m.buckets_count).unwrap_or(0)
    }

    /// Seed the bucket store with `count` freshly-allocated, empty
    /// buckets at level 0 — the index's initial state.
    pub fn seed_level_zero<K, V>(&mut self, count: u64, depth: u8, n_levels: usize, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<()>
    where
        K: Ord + Clone,
        V: Clone,
    {
        let empty = Bucket::<K, V>::empty(depth, n_levels);
        let page = empty.encode_page(kc, vc, self.page_size)?;
        for _ in 0..count {
            let idx = self.cache.allocate(0)?;
            self.cache.store(0, idx, &page)?;
        }
        self.levels.insert(0, LevelMeta { buckets_count: count, tombstone_index: NIL });
        Ok(())
    }

    pub fn load<K, V>(&self, level: u8, page_index: u64, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<Bucket<K, V>>
    where
        K: Ord + Clone,
        V: Clone,
    {
        let raw = self.cache.load(level, page_index)?;
        Bucket::decode_page(&raw, kc, vc)
    }

    pub fn store<K, V>(&self, level: u8, page_index: u64, bucket: &Bucket<K, V>, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<()>
    where
        K: Ord + Clone,
        V: Clone,
    {
        let raw = bucket.encode_page(kc, vc, self.page_size)?;
        self.cache.store(level, page_index, &raw)
    }

    /// Allocate two contiguous page indices at `level`, preferring a
    /// freed pair from the tombstone chain over growing the file. A
    /// reused pair is read back to advance the chain to its recorded
    /// `next_removed_bucket_pair`, so the caller never has to.
    pub fn allocate_pair<K, V>(&mut self, level: u8, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<(u64, u64)>
    where
        K: Ord + Clone,
        V: Clone,
    {
        let tombstone_index = self.levels.get(&level).map(|m| m.tombstone_index).unwrap_or(NIL);
        if tombstone_index != NIL {
            let first = tombstone_index as u64;
            let freed = self.load::<K, V>(level, first, kc, vc)?;
            let next = freed.next_removed_bucket_pair();
            let meta = self.levels.entry(level).or_default();
            meta.tombstone_index = next;
            meta.buckets_count += 2;
            return Ok((first, first + 1));
        }
        let a = self.cache.allocate(level)?;
        let b = self.cache.allocate(level)?;
        let meta = self.levels.entry(level).or_default();
        meta.buckets_count += 2;
        Ok((a, b))
    }

    /// Length of `level`'s tombstone chain, for diagnostics. Walks
    /// every freed page, so cost is proportional to the chain length.
    pub fn tombstone_chain_len<K, V>(&self, level: u8, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<u64>
    where
        K: Ord + Clone,
        V: Clone,
    {
        let mut next = self.levels.get(&level).map(|m| m.tombstone_index).unwrap_or(NIL);
        let mut len = 0;
        while next != NIL {
            let bucket = self.load::<K, V>(level, next as u64, kc, vc)?;
            next = bucket.next_removed_bucket_pair();
            len += 1;
        }
        Ok(len)
    }

    /// Free a bucket page back onto `level`'s tombstone chain, recording
    /// the prior head as its `next_removed_bucket_pair`.
    pub fn free_page<K, V>(&mut self, level: u8, page_index: u64, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<()>
    where
        K: Ord + Clone,
        V: Clone,
    {
        let prior_head = self.levels.get(&level).map(|m| m.tombstone_index).unwrap_or(NIL);
        let mut tombstone = Bucket::<K, V>::empty(0, 0);
        tombstone.set_next_removed_bucket_pair(prior_head);
        self.store(level, page_index, &tombstone, kc, vc)?;
        let meta = self.levels.entry(level).or_default();
        meta.tombstone_index = page_index as i64;
        if meta.buckets_count > 0 {
            meta.buckets_count -= 1;
        }
        if meta.buckets_count == 0 {
            meta.tombstone_index = NIL;
        }
        Ok(())
    }

    pub fn flush(&self, level: u8) -> Result<()> {
        self.cache.flush(level)
    }

    /// File level for a bucket at `depth`.
    pub fn level_for_depth(depth: u8, max_level_depth: u8) -> Result<u8> {
        if depth < max_level_depth {
            return err_at!(Corruption, msg: "bucket depth {} below max_level_depth {}", depth, max_level_depth);
        }
        Ok(depth - max_level_depth)
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
