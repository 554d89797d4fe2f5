//! The in-page sorted dictionary a bucket pointer resolves to: a
//! fixed-size page holding sorted entries, read back byte-for-byte on
//! reopen. `Bucket<K, V>` keeps a decoded `Vec<(K, V)>` as its working
//! representation (idiomatic for in-memory mutation) and exposes
//! `encode_page`/`decode_page` for the exact fixed-size byte layout the
//! store persists, so reads from raw storage produce identical values
//! regardless of which process wrote them — satisfied by encoding
//! entries in a fixed field order with big-endian integers.

use std::convert::TryInto;

use crate::{codec::Codec, err_at, error::Result};

/// Sentinel meaning "no next tombstone" / "no split history at this level
/// yet".
pub const NIL: i64 = -1;

/// A fixed-capacity, sorted `{key, value}` page.
///
/// `depth` is the hash-prefix length routed to this bucket (for a bucket
/// at file level `L`, `depth == L + max_level_depth`). `split_history[level]`
/// records the page index this bucket descended from at each file level,
/// so a merge can locate the parent without walking the directory.
/// `next_removed_bucket_pair` threads the per-level tombstone chain
/// through freed buckets.
#[derive(Clone, Debug)]
pub struct Bucket<K, V> {
    depth: u8,
    entries: Vec<(K, V)>,
    split_history: Vec<i64>,
    next_removed_bucket_pair: i64,
}

impl<K, V> Bucket<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    /// A fresh, empty bucket at the given `depth`, with `n_levels` split
    /// history slots pre-filled with `NIL`.
    pub fn empty(depth: u8, n_levels: usize) -> Bucket<K, V> {
        Bucket {
            depth,
            entries: Vec::new(),
            split_history: vec![NIL; n_levels],
            next_removed_bucket_pair: NIL,
        }
    }

    /// Build a bucket directly from an already key-sorted vector of
    /// entries, with `n_levels` fresh (`NIL`) split-history slots — the
    /// counterpart to [`empty`][Self::empty] for a caller that already
    /// has its entries sorted and wants to skip the per-insert routing.
    /// Not what a merge uses to rebuild its parent bucket in place: that
    /// path keeps the parent's existing split history via
    /// [`reinit`][Self::reinit] instead of discarding it.
    pub fn from_sorted(depth: u8, entries: Vec<(K, V)>, n_levels: usize) -> Bucket<K, V> {
        debug_assert!(
            entries.windows(2).all(|w| w[0].0 < w[1].0),
            "from_sorted called with an out-of-order or duplicate-keyed vector",
        );
        Bucket {
            depth,
            entries,
            split_history: vec![NIL; n_levels],
            next_removed_bucket_pair: NIL,
        }
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn set_depth(&mut self, depth: u8) {
        self.depth = depth;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_removed_bucket_pair(&self) -> i64 {
        self.next_removed_bucket_pair
    }

    pub fn set_next_removed_bucket_pair(&mut self, next: i64) {
        self.next_removed_bucket_pair = next;
    }

    pub fn split_history(&self, level: usize) -> i64 {
        *self.split_history.get(level).unwrap_or(&NIL)
    }

    pub fn set_split_history(&mut self, level: usize, page_index: i64) {
        if level >= self.split_history.len() {
            self.split_history.resize(level + 1, NIL);
        }
        self.split_history[level] = page_index;
    }

    pub fn entries(&self) -> &[(K, V)] {
        &self.entries
    }

    /// Binary search for `key`. `Ok(idx)` on an exact match, `Err(idx)`
    /// with the sorted insertion point on a miss — the idiomatic
    /// equivalent of the source's "signed index, `-(insertionPoint)-1` on
    /// miss" convention.
    pub fn index_of<Q>(&self, key: &Q) -> std::result::Result<usize, usize>
    where
        K: std::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.binary_search_by(|(k, _)| k.borrow().cmp(key))
    }

    pub fn find<Q>(&self, key: &Q) -> Option<&V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.index_of(key).ok().map(|idx| &self.entries[idx].1)
    }

    /// Sum of `codec` sizes for every entry, plus the fixed page header.
    pub fn content_size(&self, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> usize {
        PAGE_HEADER_BYTES
            + self.split_history.len() * 8
            + entries_size(self.entries.iter(), kc, vc)
    }

    /// Predicted `content_size` if `other`'s entries were appended to this
    /// bucket, used by the merge procedure.
    pub fn merged_size(&self, other: &Bucket<K, V>, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> usize {
        PAGE_HEADER_BYTES
            + self.split_history.len().max(other.split_history.len()) * 8
            + entries_size(self.entries.iter().chain(other.entries.iter()), kc, vc)
    }

    /// Insert `key`/`value` at its sorted position if `max_bucket_size`
    /// allows it. Returns `Ok(true)` on success, `Ok(false)` if the bucket
    /// is full (the caller must then split). Updates in place if `key` is
    /// already present.
    pub fn add_entry(
        &mut self,
        key: K,
        value: V,
        kc: &dyn Codec<K>,
        vc: &dyn Codec<V>,
        max_bucket_size: usize,
    ) -> Result<bool> {
        match self.index_of(&key) {
            Ok(idx) => {
                self.entries[idx].1 = value;
                Ok(true)
            }
            Err(idx) => {
                let added = entry_size(&key, &value, kc, vc);
                if self.content_size(kc, vc) + added > max_bucket_size {
                    return Ok(false);
                }
                self.entries.insert(idx, (key, value));
                Ok(true)
            }
        }
    }

    /// Append without a sortedness check, for use only when the caller
    /// already knows the append preserves order — during a split, entries
    /// are partitioned out of an already-sorted source bucket in order.
    pub fn append_entry(&mut self, key: K, value: V) {
        debug_assert!(
            self.entries.last().map(|(k, _)| k < &key).unwrap_or(true),
            "append_entry called out of order",
        );
        self.entries.push((key, value));
    }

    pub fn update_entry(&mut self, idx: usize, value: V) {
        self.entries[idx].1 = value;
    }

    pub fn delete_entry(&mut self, idx: usize) -> (K, V) {
        self.entries.remove(idx)
    }

    /// Iterate entries from `start_idx` onward, in sorted order.
    pub fn iter_from(&self, start_idx: usize) -> impl Iterator<Item = &(K, V)> {
        self.entries[start_idx.min(self.entries.len())..].iter()
    }

    /// Reinitialize this bucket at `depth` with no entries, keeping its
    /// allocated split-history slots (used when a merge rebuilds the
    /// parent bucket in place).
    pub fn reinit(&mut self, depth: u8) {
        self.depth = depth;
        self.entries.clear();
        self.next_removed_bucket_pair = NIL;
    }

    /// Serialize to a fixed-size page of exactly `page_size` bytes.
    /// Errors if the encoded content would overflow the page.
    pub fn encode_page(
        &self,
        kc: &dyn Codec<K>,
        vc: &dyn Codec<V>,
        page_size: usize,
    ) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; page_size];
        let mut off = 0usize;

        buf[off] = self.depth;
        off += 1;

        let count: u32 = match self.entries.len().try_into() {
            Ok(n) => n,
            Err(_) => return err_at!(Fatal, msg: "bucket entry count overflow"),
        };
        buf[off..off + 4].copy_from_slice(&count.to_be_bytes());
        off += 4;

        buf[off..off + 8].copy_from_slice(&self.next_removed_bucket_pair.to_be_bytes());
        off += 8;

        let n_levels: u32 = match self.split_history.len().try_into() {
            Ok(n) => n,
            Err(_) => return err_at!(Fatal, msg: "split history length overflow"),
        };
        buf[off..off + 4].copy_from_slice(&n_levels.to_be_bytes());
        off += 4;

        for sh in &self.split_history {
            buf[off..off + 8].copy_from_slice(&sh.to_be_bytes());
            off += 8;
        }

        for (k, v) in &self.entries {
            if off + kc.size(k) > buf.len() {
                return err_at!(Fatal, msg: "bucket page overflow encoding key");
            }
            kc.encode(k, &mut buf, off)?;
            off += kc.size(k);

            if off + vc.size(v) > buf.len() {
                return err_at!(Fatal, msg: "bucket page overflow encoding value");
            }
            vc.encode(v, &mut buf, off)?;
            off += vc.size(v);
        }

        Ok(buf)
    }

    /// Reverse of `encode_page`.
    pub fn decode_page(buf: &[u8], kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> Result<Bucket<K, V>> {
        if buf.len() < PAGE_HEADER_BYTES {
            return err_at!(Corruption, msg: "bucket page shorter than header");
        }
        let mut off = 0usize;

        let depth = buf[off];
        off += 1;

        let count = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        off += 4;

        let next_removed_bucket_pair = i64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;

        let n_levels = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        off += 4;

        if buf.len() < off + n_levels * 8 {
            return err_at!(Corruption, msg: "bucket page truncated split history");
        }
        let mut split_history = Vec::with_capacity(n_levels);
        for _ in 0..n_levels {
            split_history.push(i64::from_be_bytes(buf[off..off + 8].try_into().unwrap()));
            off += 8;
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let (key, kn) = kc.decode(buf, off)?;
            off += kn;
            let (value, vn) = vc.decode(buf, off)?;
            off += vn;
            entries.push((key, value));
        }

        Ok(Bucket {
            depth,
            entries,
            split_history,
            next_removed_bucket_pair,
        })
    }
}

/// Fixed portion of the page layout: depth(1) + count(4) +
/// next_removed_bucket_pair(8) + n_levels(4).
const PAGE_HEADER_BYTES: usize = 1 + 4 + 8 + 4;

/// `kc.size(key)`, skipping the call when every `K` encodes to the same
/// size.
fn key_size<K>(key: &K, kc: &dyn Codec<K>) -> usize {
    kc.fixed_length().unwrap_or_else(|| kc.size(key))
}

/// `vc.size(value)`, skipping the call when every `V` encodes to the same
/// size.
fn value_size<V>(value: &V, vc: &dyn Codec<V>) -> usize {
    vc.fixed_length().unwrap_or_else(|| vc.size(value))
}

fn entry_size<K, V>(key: &K, value: &V, kc: &dyn Codec<K>, vc: &dyn Codec<V>) -> usize {
    key_size(key, kc) + value_size(value, vc)
}

fn entries_size<'a, K: 'a, V: 'a>(
    entries: impl Iterator<Item = &'a (K, V)>,
    kc: &dyn Codec<K>,
    vc: &dyn Codec<V>,
) -> usize {
    entries.map(|(k, v)| entry_size(k, v, kc, vc)).sum()
}

/// `Error::Corruption` raised by assertions elsewhere in the crate
/// (directory resolution) when a hash routed to a bucket does not share
/// that bucket's depth-prefix.
pub fn check_bucket_depth(hash: u64, depth: u8, expect_prefix: u64) -> Result<()> {
    let prefix = if depth == 0 {
        0
    } else {
        hash >> (64 - depth as u32)
    };
    if prefix != expect_prefix {
        return err_at!(
            Corruption,
            msg: "hash prefix mismatch at depth {}: {:x} != {:x}", depth, prefix, expect_prefix
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
