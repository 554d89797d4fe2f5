//! A persistent, directory-based extendible hash index.
//!
//! [`HashIndex`] maps keys to values through a growable directory of
//! fixed-size buckets: buckets split when they overflow and merge back
//! together when they empty out, so the structure grows and shrinks
//! with the data it holds rather than being sized up front.
//!
//! Collaborators compose roughly bottom-up:
//!
//! - [`bucket`] — the fixed-size sorted page a bucket pointer resolves to.
//! - [`directory`] — routes a hash to a bucket pointer through a tree of
//!   growable directory nodes.
//! - [`store`] — per-level bucket files and their tombstone free-lists.
//! - [`split_buffer`] — staging area for freshly split pages ahead of the
//!   page cache.
//! - [`engine`] — lookup, insert/split, remove/merge, and the ordered
//!   range walks, operating on the three collaborators above.
//! - [`lock`] and [`guard`] — the reader/writer spin-lock serializing
//!   access to the engine's mutable state.
//! - [`index`] — the public facade tying all of the above to a
//!   [`cache::PageCache`], a [`hash::KeyHasher`], and a pair of
//!   [`codec::Codec`]s.
//! - [`state`] — persists the directory and bucket-store bookkeeping
//!   across a close/reopen cycle.

pub mod bucket;
pub mod cache;
pub mod codec;
pub mod directory;
pub mod engine;
pub mod error;
pub mod guard;
pub mod hash;
pub mod index;
pub mod lock;
mod marker;
pub mod metrics;
pub mod options;
pub mod split_buffer;
pub mod state;
pub mod store;
pub mod util;

pub use error::{Error, Result};
pub use index::HashIndex;
pub use options::IndexOptions;
