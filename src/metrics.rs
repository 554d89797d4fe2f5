//! Injectable metrics sink, in the same style as [`crate::lock::Stats`]:
//! plain `AtomicU64` counters exposed through a small trait so a caller can
//! plug in their own sink instead of the index reaching for a process-wide
//! global.

use std::{
    fmt, result,
    sync::atomic::{AtomicU64, Ordering::SeqCst},
};

/// Sink for counters the hash index emits while operating. Implementors
/// are shared behind `&self`; all methods must be safe to call from any
/// thread without external synchronization.
pub trait Metrics: Send + Sync {
    fn record_lookup(&self) {}
    fn record_insert(&self) {}
    fn record_update(&self) {}
    fn record_remove(&self) {}
    fn record_bucket_split(&self) {}
    fn record_bucket_merge(&self) {}
    fn record_node_split(&self) {}
    fn record_node_merge(&self) {}
    fn record_lock_conflict(&self) {}
    fn record_split_buffer_drain(&self, pages: usize) {
        let _ = pages;
    }
}

/// No-op sink, the default when a caller doesn't care.
#[derive(Clone, Copy, Default)]
pub struct NullMetrics;

impl Metrics for NullMetrics {}

/// Reference sink using the same `AtomicU64` counter style as
/// [`crate::lock::RwSpinLock`].
#[derive(Default)]
pub struct AtomicMetrics {
    lookups: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    removes: AtomicU64,
    bucket_splits: AtomicU64,
    bucket_merges: AtomicU64,
    node_splits: AtomicU64,
    node_merges: AtomicU64,
    lock_conflicts: AtomicU64,
    split_buffer_drains: AtomicU64,
    split_buffer_pages_flushed: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> AtomicMetrics {
        AtomicMetrics::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lookups: self.lookups.load(SeqCst),
            inserts: self.inserts.load(SeqCst),
            updates: self.updates.load(SeqCst),
            removes: self.removes.load(SeqCst),
            bucket_splits: self.bucket_splits.load(SeqCst),
            bucket_merges: self.bucket_merges.load(SeqCst),
            node_splits: self.node_splits.load(SeqCst),
            node_merges: self.node_merges.load(SeqCst),
            lock_conflicts: self.lock_conflicts.load(SeqCst),
            split_buffer_drains: self.split_buffer_drains.load(SeqCst),
            split_buffer_pages_flushed: self.split_buffer_pages_flushed.load(SeqCst),
        }
    }
}

impl Metrics for AtomicMetrics {
    fn record_lookup(&self) {
        self.lookups.fetch_add(1, SeqCst);
    }
    fn record_insert(&self) {
        self.inserts.fetch_add(1, SeqCst);
    }
    fn record_update(&self) {
        self.updates.fetch_add(1, SeqCst);
    }
    fn record_remove(&self) {
        self.removes.fetch_add(1, SeqCst);
    }
    fn record_bucket_split(&self) {
        self.bucket_splits.fetch_add(1, SeqCst);
    }
    fn record_bucket_merge(&self) {
        self.bucket_merges.fetch_add(1, SeqCst);
    }
    fn record_node_split(&self) {
        self.node_splits.fetch_add(1, SeqCst);
    }
    fn record_node_merge(&self) {
        self.node_merges.fetch_add(1, SeqCst);
    }
    fn record_lock_conflict(&self) {
        self.lock_conflicts.fetch_add(1, SeqCst);
    }
    fn record_split_buffer_drain(&self, pages: usize) {
        self.split_buffer_drains.fetch_add(1, SeqCst);
        self.split_buffer_pages_flushed
            .fetch_add(pages as u64, SeqCst);
    }
}

/// Point-in-time copy of an [`AtomicMetrics`] sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub lookups: u64,
    pub inserts: u64,
    pub updates: u64,
    pub removes: u64,
    pub bucket_splits: u64,
    pub bucket_merges: u64,
    pub node_splits: u64,
    pub node_merges: u64,
    pub lock_conflicts: u64,
    pub split_buffer_drains: u64,
    pub split_buffer_pages_flushed: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(
            f,
            concat!(
                "{{ lookups={}, inserts={}, updates={}, removes={}, ",
                "bucket_splits={}, bucket_merges={}, node_splits={}, node_merges={}, ",
                "lock_conflicts={}, split_buffer_drains={}, split_buffer_pages_flushed={} }}",
            ),
            self.lookups,
            self.inserts,
            self.updates,
            self.removes,
            self.bucket_splits,
            self.bucket_merges,
            self.node_splits,
            self.node_merges,
            self.lock_conflicts,
            self.split_buffer_drains,
            self.split_buffer_pages_flushed,
        )
    }
}
