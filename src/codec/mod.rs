//! Binary serializer collaborator for a key or value type.
//!
//! `encode`/`decode` against a raw byte buffer, the same shape as a plain
//! `Serialize` trait, but `Codec` also exposes `size(value)` up front so a
//! bucket can test free space before committing to an `encode`.

mod bytes;
mod fixed;

pub use bytes::BinaryCodec;
pub use fixed::{I64Codec, U64Codec};

use crate::error::Result;

/// External binary codec for a key or value type `T`.
///
/// `size`/`encode`/`decode` operate on raw byte offsets so that a [Bucket]
/// page can lay out several entries back to back without intermediate
/// allocation per entry. `encode` must write exactly `size(value)` bytes.
///
/// [Bucket]: crate::bucket::Bucket
pub trait Codec<T>: Send + Sync {
    /// Encoded size of `value`, in bytes.
    fn size(&self, value: &T) -> usize;

    /// `true` if every value of `T` encodes to the same `size`. When
    /// `Some`, a bucket's size accounting uses this instead of calling
    /// `size` on each entry.
    fn fixed_length(&self) -> Option<usize> {
        None
    }

    /// Write `value`'s binary encoding at `buf[offset..]`. `buf` must have
    /// at least `size(value)` bytes remaining from `offset`.
    fn encode(&self, value: &T, buf: &mut [u8], offset: usize) -> Result<()>;

    /// Reverse of `encode`: reconstruct a `T` from `buf[offset..]`. Returns
    /// the value and the number of bytes consumed.
    fn decode(&self, buf: &[u8], offset: usize) -> Result<(T, usize)>;
}
