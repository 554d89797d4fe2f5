//! Persists and reloads the directory tree plus per-level bucket store
//! bookkeeping across a close/reopen cycle.
//!
//! Two files: a small **metadata** file (records count, page size, and
//! the [`PersistedOptions`] a reopen must agree with), persisted with
//! [`cbordata::Cborize`] in a `Stats`-record style since it is a handful
//! of named fields that change shape across versions; and a **tree
//! state** file, a dense hand-rolled binary layout (mirroring
//! [`crate::bucket`]'s page format) since it is a large, fixed-shape
//! array of node records where a tagged/self-describing encoding would
//! cost real bytes for no benefit.
//!
//! Nodes are stored at their actual `2^local_depth` size rather than a
//! fixed-size region (see `DESIGN.md`), so no `maxLeftChildDepth`/
//! `maxRightChildDepth` bookkeeping is needed; [`crate::directory`]'s
//! buddy lookup works from the stored sizes directly.
//!
//! The tree-state file ends with [`crate::marker::TREE_STATE_MARKER`], a
//! tail-marker discipline: a reopen that finds the marker missing or
//! mismatched knows the file was cut short mid-write rather than trying
//! to make sense of a partially-decoded directory.

use std::{
    collections::HashMap,
    convert::TryInto,
    ffi,
    fs,
    io::{Read, Write},
    path::PathBuf,
};

use cbordata::Cborize;

use crate::{
    directory::Directory,
    err_at,
    error::Result,
    marker::TREE_STATE_MARKER,
    options::PersistedOptions,
    util::{from_cbor_bytes, into_cbor_bytes},
};

const METADATA_STATS_ID: u32 = 0x6578_6801; // "exh" + version 1

/// Persisted index-level metadata.
#[derive(Clone, Debug, Cborize)]
pub struct Metadata {
    pub records_count: u64,
    pub page_size: u64,
    pub options: PersistedOptionsRecord,
}

impl Metadata {
    const ID: u32 = METADATA_STATS_ID;
}

/// [`PersistedOptions`] in a cbor-friendly shape (plain fields only).
#[derive(Clone, Debug, Cborize)]
pub struct PersistedOptionsRecord {
    pub max_bucket_size_bytes: u64,
    pub max_level_depth: u8,
}

impl PersistedOptionsRecord {
    const ID: u32 = METADATA_STATS_ID + 1;
}

impl From<&PersistedOptions> for PersistedOptionsRecord {
    fn from(opts: &PersistedOptions) -> PersistedOptionsRecord {
        PersistedOptionsRecord {
            max_bucket_size_bytes: opts.max_bucket_size_bytes as u64,
            max_level_depth: opts.max_level_depth,
        }
    }
}

impl From<&PersistedOptionsRecord> for PersistedOptions {
    fn from(rec: &PersistedOptionsRecord) -> PersistedOptions {
        PersistedOptions {
            max_bucket_size_bytes: rec.max_bucket_size_bytes as usize,
            max_level_depth: rec.max_level_depth,
        }
    }
}

fn metadata_path(dir: &ffi::OsStr, name: &str) -> PathBuf {
    PathBuf::from(dir).join(format!("{}.metadata", name))
}

fn tree_state_path(dir: &ffi::OsStr, name: &str) -> PathBuf {
    PathBuf::from(dir).join(format!("{}.treestate", name))
}

/// Persist `records_count` and `options` to the metadata file.
pub fn save_metadata(dir: &ffi::OsStr, name: &str, records_count: u64, page_size: usize, options: &PersistedOptions) -> Result<()> {
    let metadata = Metadata {
        records_count,
        page_size: page_size as u64,
        options: options.into(),
    };
    let bytes = into_cbor_bytes(metadata)?;
    err_at!(Index, fs::write(metadata_path(dir, name), bytes))?;
    Ok(())
}

/// Load a previously persisted metadata file, returning
/// `(records_count, page_size, options)`.
pub fn load_metadata(dir: &ffi::OsStr, name: &str) -> Result<(u64, usize, PersistedOptions)> {
    let bytes = err_at!(Index, fs::read(metadata_path(dir, name)))?;
    let (metadata, _): (Metadata, usize) = from_cbor_bytes(&bytes)?;
    Ok((metadata.records_count, metadata.page_size as usize, (&metadata.options).into()))
}

/// Persist the directory tree and per-level bucket store bookkeeping.
pub fn save_tree_state(
    dir: &ffi::OsStr,
    name: &str,
    max_level_depth: u8,
    directory: &Directory,
    levels: &HashMap<u8, (u64, i64)>,
) -> Result<()> {
    let (raw_nodes, tombstones, tombstone_head) = directory.to_parts();

    let mut buf = Vec::new();
    buf.push(max_level_depth);
    buf.extend_from_slice(&tombstone_head.to_be_bytes());

    let node_count: u32 = match raw_nodes.len().try_into() {
        Ok(n) => n,
        Err(_) => return err_at!(Fatal, msg: "directory node count overflow"),
    };
    buf.extend_from_slice(&node_count.to_be_bytes());

    for node in &raw_nodes {
        match node {
            None => buf.push(0),
            Some((local_depth, slots)) => {
                buf.push(1);
                buf.push(*local_depth);
                let len: u32 = match slots.len().try_into() {
                    Ok(n) => n,
                    Err(_) => return err_at!(Fatal, msg: "node slot count overflow"),
                };
                buf.extend_from_slice(&len.to_be_bytes());
                for slot in slots {
                    buf.extend_from_slice(&slot.to_be_bytes());
                }
            }
        }
    }

    let tombstone_count: u32 = match tombstones.len().try_into() {
        Ok(n) => n,
        Err(_) => return err_at!(Fatal, msg: "tombstone count overflow"),
    };
    buf.extend_from_slice(&tombstone_count.to_be_bytes());
    for (idx, next) in &tombstones {
        let idx: u32 = match (*idx).try_into() {
            Ok(n) => n,
            Err(_) => return err_at!(Fatal, msg: "tombstone index overflow"),
        };
        buf.extend_from_slice(&idx.to_be_bytes());
        buf.extend_from_slice(&next.to_be_bytes());
    }

    let level_count: u32 = match levels.len().try_into() {
        Ok(n) => n,
        Err(_) => return err_at!(Fatal, msg: "level count overflow"),
    };
    buf.extend_from_slice(&level_count.to_be_bytes());
    let mut sorted_levels: Vec<_> = levels.iter().collect();
    sorted_levels.sort_by_key(|(level, _)| **level);
    for (level, (buckets_count, tombstone_index)) in sorted_levels {
        buf.push(*level);
        buf.extend_from_slice(&buckets_count.to_be_bytes());
        buf.extend_from_slice(&tombstone_index.to_be_bytes());
    }

    buf.extend_from_slice(&TREE_STATE_MARKER);

    let path = tree_state_path(dir, name);
    let mut file = err_at!(Index, fs::File::create(&path))?;
    err_at!(Index, file.write_all(&buf))?;
    Ok(())
}

/// Reverse of [`save_tree_state`].
pub fn load_tree_state(dir: &ffi::OsStr, name: &str) -> Result<(u8, Directory, HashMap<u8, (u64, i64)>)> {
    let mut file = err_at!(Index, fs::File::open(tree_state_path(dir, name)))?;
    let mut buf = Vec::new();
    err_at!(Index, file.read_to_end(&mut buf))?;

    let mut off = 0usize;
    let max_level_depth = read_u8(&buf, &mut off)?;
    let tombstone_head = read_i32(&buf, &mut off)?;
    let node_count = read_u32(&buf, &mut off)? as usize;

    let mut raw_nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let tag = read_u8(&buf, &mut off)?;
        if tag == 0 {
            raw_nodes.push(None);
        } else {
            let local_depth = read_u8(&buf, &mut off)?;
            let len = read_u32(&buf, &mut off)? as usize;
            let mut slots = Vec::with_capacity(len);
            for _ in 0..len {
                slots.push(read_u64(&buf, &mut off)?);
            }
            raw_nodes.push(Some((local_depth, slots)));
        }
    }

    let tombstone_count = read_u32(&buf, &mut off)? as usize;
    let mut tombstones = Vec::with_capacity(tombstone_count);
    for _ in 0..tombstone_count {
        let idx = read_u32(&buf, &mut off)? as usize;
        let next = read_i32(&buf, &mut off)?;
        tombstones.push((idx, next));
    }

    let level_count = read_u32(&buf, &mut off)? as usize;
    let mut levels = HashMap::with_capacity(level_count);
    for _ in 0..level_count {
        let level = read_u8(&buf, &mut off)?;
        let buckets_count = read_u64(&buf, &mut off)?;
        let tombstone_index = read_i64(&buf, &mut off)?;
        levels.insert(level, (buckets_count, tombstone_index));
    }

    let marker_len = TREE_STATE_MARKER.len();
    if buf.len() < off + marker_len || &buf[off..off + marker_len] != TREE_STATE_MARKER.as_slice() {
        return err_at!(Corruption, msg: "tree state file missing or mismatched tail marker, likely truncated");
    }

    let directory = Directory::from_parts(max_level_depth, raw_nodes, tombstones, tombstone_head);
    Ok((max_level_depth, directory, levels))
}

fn read_u8(buf: &[u8], off: &mut usize) -> Result<u8> {
    if buf.len() < *off + 1 {
        return err_at!(Corruption, msg: "tree state truncated reading u8");
    }
    let v = buf[*off];
    *off += 1;
    Ok(v)
}

fn read_u32(buf: &[u8], off: &mut usize) -> Result<u32> {
    if buf.len() < *off + 4 {
        return err_at!(Corruption, msg: "tree state truncated reading u32");
    }
    let v = u32::from_be_bytes(buf[*off..*off + 4].try_into().unwrap());
    *off += 4;
    Ok(v)
}

fn read_i32(buf: &[u8], off: &mut usize) -> Result<i32> {
    if buf.len() < *off + 4 {
        return err_at!(Corruption, msg: "tree state truncated reading i32");
    }
    let v = i32::from_be_bytes(buf[*off..*off + 4].try_into().unwrap());
    *off += 4;
    Ok(v)
}

fn read_u64(buf: &[u8], off: &mut usize) -> Result<u64> {
    if buf.len() < *off + 8 {
        return err_at!(Corruption, msg: "tree state truncated reading u64");
    }
    let v = u64::from_be_bytes(buf[*off..*off + 8].try_into().unwrap());
    *off += 8;
    Ok(v)
}

fn read_i64(buf: &[u8], off: &mut usize) -> Result<i64> {
    if buf.len() < *off + 8 {
        return err_at!(Corruption, msg: "tree state truncated reading i64");
    }
    let v = i64::from_be_bytes(buf[*off..*off + 8].try_into().unwrap());
    *off += 8;
    Ok(v)
}

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;
