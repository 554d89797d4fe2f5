//! The split buffer staging newly-split bucket pages ahead of the page
//! cache: a per-level sorted map, consulted before the cache on every
//! page access, drained deterministically (levels in order, page
//! indices ascending) once the aggregate buffered count crosses a
//! threshold.

use std::collections::BTreeMap;

use crate::{bucket::Bucket, cache::PageCache, codec::Codec, error::Result, store::BucketStore};

/// Staging area for freshly split bucket pages, keyed by
/// `(file_level, page_index)` in a sort order that matches the drain
/// order: levels in order, page index ascending within a level.
pub struct SplitBuffer<K, V> {
    pages: BTreeMap<(u8, u64), Bucket<K, V>>,
    limit: usize,
}

impl<K: Clone, V: Clone> SplitBuffer<K, V> {
    pub fn new(limit: usize) -> SplitBuffer<K, V> {
        SplitBuffer { pages: BTreeMap::new(), limit }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Stage a just-written page, observed by callers ahead of the cache.
    pub fn stage(&mut self, level: u8, page_index: u64, bucket: Bucket<K, V>) {
        self.pages.insert((level, page_index), bucket);
    }

    /// Look up a staged page, consulted before falling through to the
    /// page cache.
    pub fn get(&self, level: u8, page_index: u64) -> Option<&Bucket<K, V>> {
        self.pages.get(&(level, page_index))
    }

    pub fn get_mut(&mut self, level: u8, page_index: u64) -> Option<&mut Bucket<K, V>> {
        self.pages.get_mut(&(level, page_index))
    }

    pub fn over_threshold(&self) -> bool {
        self.pages.len() > self.limit
    }

    /// Flush every staged page to the backing store, in level-then-index
    /// order, and clear the buffer.
    pub fn drain<C: PageCache>(&mut self, store: &BucketStore<C>, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<()>
    where
        K: Ord,
    {
        for ((level, page_index), bucket) in self.pages.iter() {
            store.store(*level, *page_index, bucket, kc, vc)?;
        }
        for level in self.pages.keys().map(|(level, _)| *level).collect::<std::collections::BTreeSet<_>>() {
            store.flush(level)?;
        }
        self.pages.clear();
        Ok(())
    }

    /// Drop a single staged page without flushing — used once a page is
    /// found clean and was already durably written by `drain`, or by a
    /// merge that supersedes it before it was ever drained.
    pub fn discard(&mut self, level: u8, page_index: u64) {
        self.pages.remove(&(level, page_index));
    }
}

#[cfg(test)]
#[path = "split_buffer_test.rs"]
mod split_buffer_test;
