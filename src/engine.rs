//! The operation engine — lookup, insert with split cascade, remove with
//! merge cascade, and the four ordered range walks.
//!
//! Every function here takes `&Inner`/`&mut Inner` directly rather than a
//! lock guard: instance-level locking is [`crate::index::HashIndex`]'s
//! concern (acquire a [`crate::guard::ReadGuard`]/[`crate::guard::WriteGuard`]
//! around [`crate::guard::RwGuarded`], then call into this module with the
//! guard's `&mut Inner` obtained through `DerefMut`). This keeps the split
//! and merge procedures free of lock bookkeeping, with only the caller in
//! `index.rs` holding the synchronization.
//!
//! Every bucket lookup re-fetches its page fresh on every hop (split buffer
//! first, then the page cache) instead of caching a page handle across
//! calls, so a long-lived range walk never reads through a stale handle.

use std::borrow::Borrow;

use crate::{
    bucket::{check_bucket_depth, Bucket},
    cache::PageCache,
    codec::Codec,
    directory::{BucketPath, BucketPointer, Directory},
    err_at,
    error::Result,
    hash::KeyHasher,
    metrics::Metrics,
    options::IndexOptions,
    split_buffer::SplitBuffer,
    store::BucketStore,
};

/// The index's mutable state, guarded as a unit by a single
/// [`crate::lock::RwSpinLock`]: one writer, many readers, never both.
pub struct Inner<K, V, C: PageCache> {
    pub directory: Directory,
    pub store: BucketStore<C>,
    pub split_buffer: SplitBuffer<K, V>,
    pub records_count: u64,
}

impl<K, V, C: PageCache> Inner<K, V, C> {
    pub fn new(directory: Directory, store: BucketStore<C>, split_buffer_limit: usize) -> Inner<K, V, C> {
        Inner {
            directory,
            store,
            split_buffer: SplitBuffer::new(split_buffer_limit),
            records_count: 0,
        }
    }
}

fn load_bucket<K, V, C>(inner: &Inner<K, V, C>, pointer: BucketPointer, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<Bucket<K, V>>
where
    K: Ord + Clone,
    V: Clone,
    C: PageCache,
{
    match inner.split_buffer.get(pointer.file_level, pointer.page_index) {
        Some(bucket) => Ok(bucket.clone()),
        None => inner.store.load(pointer.file_level, pointer.page_index, kc, vc),
    }
}

/// Write a bucket back to wherever it is currently homed: the split buffer
/// if it is still staged there, the page cache otherwise.
fn store_bucket<K, V, C>(
    inner: &mut Inner<K, V, C>,
    pointer: BucketPointer,
    bucket: &Bucket<K, V>,
    kc: &dyn Codec<K>,
    vc: &dyn Codec<V>,
) -> Result<()>
where
    K: Ord + Clone,
    V: Clone,
    C: PageCache,
{
    if inner.split_buffer.get(pointer.file_level, pointer.page_index).is_some() {
        inner.split_buffer.stage(pointer.file_level, pointer.page_index, bucket.clone());
        Ok(())
    } else {
        inner.store.store(pointer.file_level, pointer.page_index, bucket, kc, vc)
    }
}

/// Point lookup by key.
pub fn get<K, V, Q, C>(inner: &Inner<K, V, C>, hash: u64, key: &Q, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<Option<V>>
where
    K: Ord + Clone + Borrow<Q>,
    V: Clone,
    Q: Ord + ?Sized,
    C: PageCache,
{
    let path = inner.directory.resolve(hash)?;
    let bucket = load_bucket(inner, path.pointer, kc, vc)?;
    check_bucket_depth(hash, bucket.depth(), hash >> (64 - bucket.depth() as u32))?;
    Ok(bucket.find(key).cloned())
}

/// Insert or update: update in place if `key` is present, otherwise
/// append, splitting and retrying as many times as the insert requires.
pub fn put<K, V, H, C>(
    inner: &mut Inner<K, V, C>,
    hasher: &H,
    key: K,
    value: V,
    options: &IndexOptions,
    metrics: &dyn Metrics,
    kc: &dyn Codec<K>,
    vc: &dyn Codec<V>,
) -> Result<()>
where
    K: Ord + Clone,
    V: Clone,
    H: KeyHasher<K> + ?Sized,
    C: PageCache,
{
    let hash = hasher.hash_key(&key);
    loop {
        let path = inner.directory.resolve(hash)?;
        let mut bucket = load_bucket(inner, path.pointer, kc, vc)?;
        let existed = bucket.find(&key).is_some();

        if bucket.add_entry(key.clone(), value.clone(), kc, vc, options.max_bucket_size_bytes)? {
            store_bucket(inner, path.pointer, &bucket, kc, vc)?;
            if existed {
                metrics.record_update();
            } else {
                inner.records_count += 1;
                metrics.record_insert();
            }
            return Ok(());
        }

        if bucket.is_empty() {
            let too_large = kc.size(&key) + vc.size(&value);
            if options.key_too_large_is_error {
                return err_at!(KeyTooLarge, msg: "entry of {} bytes does not fit an empty bucket of {} bytes", too_large, options.max_bucket_size_bytes);
            }
            log::warn!("dropping oversized insert of {} bytes", too_large);
            return Ok(());
        }

        split(inner, hasher, &path, &bucket, options, metrics, kc, vc)?;
    }
}

/// The split procedure, followed by
/// publishing the new pointers through the directory.
fn split<K, V, H, C>(
    inner: &mut Inner<K, V, C>,
    hasher: &H,
    path: &BucketPath,
    source: &Bucket<K, V>,
    options: &IndexOptions,
    metrics: &dyn Metrics,
    kc: &dyn Codec<K>,
    vc: &dyn Codec<V>,
) -> Result<()>
where
    K: Ord + Clone,
    V: Clone,
    H: KeyHasher<K> + ?Sized,
    C: PageCache,
{
    let new_depth = source.depth() + 1;
    let new_level = BucketStore::<C>::level_for_depth(new_depth, options.max_level_depth)?;
    let source_level = path.pointer.file_level;
    let n_levels = new_level as usize + 1;

    let (updated_idx, new_idx) = inner.store.allocate_pair::<K, V>(new_level, kc, vc)?;

    let mut updated = Bucket::<K, V>::empty(new_depth, n_levels);
    let mut fresh = Bucket::<K, V>::empty(new_depth, n_levels);
    for (k, v) in source.entries() {
        let h = hasher.hash_key(k);
        if (h >> (64 - new_depth as u32)) & 1 == 0 {
            updated.append_entry(k.clone(), v.clone());
        } else {
            fresh.append_entry(k.clone(), v.clone());
        }
    }
    updated.set_split_history(source_level as usize, path.pointer.page_index as i64);
    fresh.set_split_history(source_level as usize, path.pointer.page_index as i64);

    inner.split_buffer.stage(new_level, updated_idx, updated);
    inner.split_buffer.stage(new_level, new_idx, fresh);

    // The source page is now logically dead; retire it onto its own
    // level's tombstone chain instead of merely marking it clean, so the
    // freed slot is actually reusable by a future split at that level.
    inner.store.free_page::<K, V>(source_level, path.pointer.page_index, kc, vc)?;
    inner.split_buffer.discard(source_level, path.pointer.page_index);

    let updated_ptr = BucketPointer { page_index: updated_idx, file_level: new_level };
    let new_ptr = BucketPointer { page_index: new_idx, file_level: new_level };
    let node_grew = inner.directory.publish_split(path, new_depth, updated_ptr, new_ptr)?;
    metrics.record_bucket_split();
    log::debug!("bucket split at depth {} (file level {})", new_depth, new_level);
    if node_grew {
        metrics.record_node_split();
        log::debug!("directory node grew to absorb depth {}", new_depth);
    }

    if inner.split_buffer.over_threshold() {
        let pages = inner.split_buffer.len();
        inner.split_buffer.drain(&inner.store, kc, vc)?;
        metrics.record_split_buffer_drain(pages);
    }
    Ok(())
}

/// Remove by key. Returns `true` if `key` was present.
pub fn remove<K, V, Q, H, C>(
    inner: &mut Inner<K, V, C>,
    hasher: &H,
    key: &Q,
    options: &IndexOptions,
    metrics: &dyn Metrics,
    kc: &dyn Codec<K>,
    vc: &dyn Codec<V>,
) -> Result<bool>
where
    K: Ord + Clone + Borrow<Q>,
    V: Clone,
    Q: Ord + ?Sized,
    H: KeyHasher<Q> + ?Sized,
    C: PageCache,
{
    let hash = hasher.hash_key(key);
    let path = inner.directory.resolve(hash)?;
    let mut bucket = load_bucket(inner, path.pointer, kc, vc)?;

    let idx = match bucket.index_of(key) {
        Ok(idx) => idx,
        Err(_) => return Ok(false),
    };
    bucket.delete_entry(idx);
    inner.records_count -= 1;
    store_bucket(inner, path.pointer, &bucket, kc, vc)?;
    metrics.record_remove();

    attempt_merge(inner, &path, &bucket, options, metrics, kc, vc)?;
    Ok(true)
}

/// The merge procedure. A no-op if the
/// merge predicate fails or the buddy cannot be merged with.
fn attempt_merge<K, V, C>(
    inner: &mut Inner<K, V, C>,
    path: &BucketPath,
    bucket: &Bucket<K, V>,
    options: &IndexOptions,
    metrics: &dyn Metrics,
    kc: &dyn Codec<K>,
    vc: &dyn Codec<V>,
) -> Result<()>
where
    K: Ord + Clone,
    V: Clone,
    C: PageCache,
{
    if path.pointer.file_level == 0 {
        return Ok(()); // bucketDepth - MAX_LEVEL_DEPTH >= 1 required.
    }
    let threshold = (options.merge_threshold * options.max_bucket_size_bytes as f64) as usize;
    if bucket.content_size(kc, vc) >= threshold {
        return Ok(());
    }

    let buddy_ptr = inner.directory.find_buddy(path, bucket.depth())?;
    let buddy_bucket = load_bucket(inner, buddy_ptr, kc, vc)?;
    if buddy_bucket.depth() != bucket.depth() {
        return Ok(());
    }
    if bucket.merged_size(&buddy_bucket, kc, vc) >= options.max_bucket_size_bytes {
        return Ok(());
    }

    let buddy_level = buddy_ptr.file_level;
    let parent_level = buddy_level - 1;
    let parent_page_index = buddy_bucket.split_history(parent_level as usize);
    if parent_page_index < 0 {
        return err_at!(Corruption, msg: "buddy bucket has no split history recorded for level {}", parent_level);
    }
    let parent_page_index = parent_page_index as u64;

    let mut combined: Vec<(K, V)> = buddy_bucket
        .entries()
        .iter()
        .chain(bucket.entries().iter())
        .cloned()
        .collect();
    combined.sort_by(|a, b| a.0.cmp(&b.0));

    let mut parent_bucket = inner.store.load::<K, V>(parent_level, parent_page_index, kc, vc)?;
    parent_bucket.reinit(bucket.depth() - 1);
    for (k, v) in combined {
        parent_bucket.append_entry(k, v);
    }
    inner.store.store(parent_level, parent_page_index, &parent_bucket, kc, vc)?;

    let merged_ptr = BucketPointer { page_index: parent_page_index, file_level: parent_level };
    let node_collapsed = inner.directory.publish_merge(path, buddy_ptr, merged_ptr)?;
    metrics.record_bucket_merge();
    log::debug!("bucket merge at buddy level {}", buddy_level);
    if node_collapsed {
        metrics.record_node_merge();
        log::debug!("directory node collapsed after merge at buddy level {}", buddy_level);
    }

    // Preferring the lower index to become the new tombstone head: free
    // the higher one first so the lower one's free_page call, last, ends
    // up at the chain's head.
    let (lo, hi) = if path.pointer.page_index < buddy_ptr.page_index {
        (path.pointer.page_index, buddy_ptr.page_index)
    } else {
        (buddy_ptr.page_index, path.pointer.page_index)
    };
    inner.store.free_page::<K, V>(buddy_level, hi, kc, vc)?;
    inner.store.free_page::<K, V>(buddy_level, lo, kc, vc)?;
    inner.split_buffer.discard(buddy_level, hi);
    inner.split_buffer.discard(buddy_level, lo);

    Ok(())
}

fn slice_bucket<K: Clone, V: Clone>(bucket: &Bucket<K, V>, range: std::ops::Range<usize>) -> Vec<(K, V)> {
    bucket.entries()[range].to_vec()
}

/// Walk forward from `path`, collecting every subsequent bucket's entries
/// in hash-prefix order, skipping repeated slots that resolve to the same
/// pointer a bucket already spans.
fn walk_forward<K, V, C>(
    inner: &Inner<K, V, C>,
    mut path: BucketPath,
    mut out: Vec<(K, V)>,
    kc: &dyn Codec<K>,
    vc: &dyn Codec<V>,
) -> Result<Vec<(K, V)>>
where
    K: Ord + Clone,
    V: Clone,
    C: PageCache,
{
    loop {
        match inner.directory.next_bucket(&path)? {
            None => return Ok(out),
            Some(next) => {
                log::trace!("range scan hop forward to {:?}", next.pointer);
                if next.pointer == path.pointer {
                    path = next;
                    continue;
                }
                let bucket = load_bucket(inner, next.pointer, kc, vc)?;
                out.extend(bucket.entries().iter().cloned());
                path = next;
            }
        }
    }
}

/// Mirror of [`walk_forward`], walking backward via `prev_bucket`.
fn walk_backward<K, V, C>(
    inner: &Inner<K, V, C>,
    mut path: BucketPath,
    mut out: Vec<(K, V)>,
    kc: &dyn Codec<K>,
    vc: &dyn Codec<V>,
) -> Result<Vec<(K, V)>>
where
    K: Ord + Clone,
    V: Clone,
    C: PageCache,
{
    loop {
        match inner.directory.prev_bucket(&path)? {
            None => return Ok(out),
            Some(prev) => {
                log::trace!("range scan hop backward to {:?}", prev.pointer);
                if prev.pointer == path.pointer {
                    path = prev;
                    continue;
                }
                let bucket = load_bucket(inner, prev.pointer, kc, vc)?;
                out.extend(bucket.entries().iter().cloned());
                path = prev;
            }
        }
    }
}

/// `higherEntries(key)`: strictly after `key`, in hash-prefix then key
/// order.
pub fn higher_entries<K, V, Q, C>(inner: &Inner<K, V, C>, key: &Q, hash: u64, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<Vec<(K, V)>>
where
    K: Ord + Clone + Borrow<Q>,
    V: Clone,
    Q: Ord + ?Sized,
    C: PageCache,
{
    let path = inner.directory.resolve(hash)?;
    let bucket = load_bucket(inner, path.pointer, kc, vc)?;
    let start = match bucket.index_of(key) {
        Ok(idx) => idx + 1,
        Err(idx) => idx,
    };
    let out = slice_bucket(&bucket, start..bucket.len());
    walk_forward(inner, path, out, kc, vc)
}

/// `ceilingEntries(key)`: `key` itself if present, else the next entry
/// after it, in hash-prefix then key order.
pub fn ceiling_entries<K, V, Q, C>(inner: &Inner<K, V, C>, key: &Q, hash: u64, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<Vec<(K, V)>>
where
    K: Ord + Clone + Borrow<Q>,
    V: Clone,
    Q: Ord + ?Sized,
    C: PageCache,
{
    let path = inner.directory.resolve(hash)?;
    let bucket = load_bucket(inner, path.pointer, kc, vc)?;
    let start = bucket.index_of(key).unwrap_or_else(|idx| idx);
    let out = slice_bucket(&bucket, start..bucket.len());
    walk_forward(inner, path, out, kc, vc)
}

/// `lowerEntries(key)`: strictly before `key`, walking backward in
/// hash-prefix order (each bucket's own entries still in ascending key
/// order).
pub fn lower_entries<K, V, Q, C>(inner: &Inner<K, V, C>, key: &Q, hash: u64, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<Vec<(K, V)>>
where
    K: Ord + Clone + Borrow<Q>,
    V: Clone,
    Q: Ord + ?Sized,
    C: PageCache,
{
    let path = inner.directory.resolve(hash)?;
    let bucket = load_bucket(inner, path.pointer, kc, vc)?;
    let end = match bucket.index_of(key) {
        Ok(idx) => idx,
        Err(idx) => idx,
    };
    let out = slice_bucket(&bucket, 0..end);
    walk_backward(inner, path, out, kc, vc)
}

/// `floorEntries(key)`: `key` itself if present, else the nearest entry
/// before it, walking backward in hash-prefix order.
pub fn floor_entries<K, V, Q, C>(inner: &Inner<K, V, C>, key: &Q, hash: u64, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<Vec<(K, V)>>
where
    K: Ord + Clone + Borrow<Q>,
    V: Clone,
    Q: Ord + ?Sized,
    C: PageCache,
{
    let path = inner.directory.resolve(hash)?;
    let bucket = load_bucket(inner, path.pointer, kc, vc)?;
    let end = match bucket.index_of(key) {
        Ok(idx) => idx + 1,
        Err(idx) => idx,
    };
    let out = slice_bucket(&bucket, 0..end);
    walk_backward(inner, path, out, kc, vc)
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
