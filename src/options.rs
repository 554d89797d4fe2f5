//! Construction-time configuration for a [`crate::HashIndex`].
//!
//! A plain struct built via `new()` and a handful of chainable `set_*`
//! methods, with the tunable subset that must match between a writer
//! and a later reader persisted alongside the index (see [`crate::state`]).

use std::{ffi, path::PathBuf};

/// Number of bits consumed by a single directory node.
pub const MAX_LEVEL_DEPTH: u8 = 8;
/// Number of slots in a directory node, `1 << MAX_LEVEL_DEPTH`.
pub const MAX_LEVEL_SIZE: usize = 1 << MAX_LEVEL_DEPTH as usize;
/// Default fixed page size for a bucket.
pub const MAX_BUCKET_SIZE_BYTES: usize = 4 * 1024;
/// Default fraction of `max_bucket_size_bytes` below which a bucket is a
/// merge candidate.
pub const MERGE_THRESHOLD: f64 = 0.2;
/// Default number of split-produced pages the split buffer holds before
/// draining.
pub const SPLIT_BUFFER_LIMIT: usize = 1500;

/// Construction-time and persisted configuration for a hash index.
#[derive(Clone, Debug)]
pub struct IndexOptions {
    /// Directory holding the index's files.
    pub dir: PathBuf,
    /// Unique name for this index; used to derive file names.
    pub name: String,
    /// Fixed bucket page size, in bytes.
    pub max_bucket_size_bytes: usize,
    /// Number of bits a single directory node consumes.
    pub max_level_depth: u8,
    /// `1 << max_level_depth`, cached for convenience.
    pub max_level_size: usize,
    /// Occupancy fraction below which a bucket becomes a merge candidate.
    pub merge_threshold: f64,
    /// Number of buffered split pages before the split buffer is drained.
    pub split_buffer_limit: usize,
    /// Whether an oversized key/value surfaces as `Error::KeyTooLarge`
    /// (`true`, the default) or is silently dropped with a `log::warn!`
    /// (`false`, a legacy behavior kept for backward compatibility).
    pub key_too_large_is_error: bool,
    /// Bounded spin count before an RW-lock acquirer parks.
    pub spin_before_park: u32,
}

impl IndexOptions {
    /// Create configuration for an index named `name` rooted at `dir`,
    /// with every tunable at its documented default.
    pub fn new(dir: &ffi::OsStr, name: &str) -> IndexOptions {
        IndexOptions {
            dir: PathBuf::from(dir),
            name: name.to_string(),
            max_bucket_size_bytes: MAX_BUCKET_SIZE_BYTES,
            max_level_depth: MAX_LEVEL_DEPTH,
            max_level_size: MAX_LEVEL_SIZE,
            merge_threshold: MERGE_THRESHOLD,
            split_buffer_limit: SPLIT_BUFFER_LIMIT,
            key_too_large_is_error: true,
            spin_before_park: 64,
        }
    }

    /// Override the bucket page size.
    pub fn set_bucket_size(&mut self, bytes: usize) -> &mut Self {
        self.max_bucket_size_bytes = bytes;
        self
    }

    /// Override the directory node fan-out, expressed as bits consumed per
    /// node. Only meant for shrinking the structure in tests; production
    /// callers should keep the default of 8.
    pub fn set_level_depth(&mut self, depth: u8) -> &mut Self {
        self.max_level_depth = depth;
        self.max_level_size = 1usize << depth;
        self
    }

    /// Override the merge-candidate occupancy threshold.
    pub fn set_merge_threshold(&mut self, threshold: f64) -> &mut Self {
        self.merge_threshold = threshold;
        self
    }

    /// Override the split buffer drain threshold.
    pub fn set_split_buffer_limit(&mut self, limit: usize) -> &mut Self {
        self.split_buffer_limit = limit;
        self
    }

    /// Control whether an oversized entry is an error or a dropped-insert
    /// warning.
    pub fn set_key_too_large_is_error(&mut self, is_error: bool) -> &mut Self {
        self.key_too_large_is_error = is_error;
        self
    }
}

/// Subset of [`IndexOptions`] that must agree between the options an index
/// was built with and the options used to reopen it. Persisted in the
/// metadata file (see [`crate::state`]).
#[derive(Clone, Debug, PartialEq)]
pub struct PersistedOptions {
    pub max_bucket_size_bytes: usize,
    pub max_level_depth: u8,
}

impl From<&IndexOptions> for PersistedOptions {
    fn from(opts: &IndexOptions) -> PersistedOptions {
        PersistedOptions {
            max_bucket_size_bytes: opts.max_bucket_size_bytes,
            max_level_depth: opts.max_level_depth,
        }
    }
}
