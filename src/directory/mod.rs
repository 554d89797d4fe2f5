//! The directory tree that routes a hash to a bucket pointer: an array
//! of slots, some of which are themselves sub-trees. Every node holds
//! `2^local_depth` slots (capped at
//! [`MAX_LEVEL_SIZE`][crate::options::MAX_LEVEL_SIZE]), and a node whose
//! local depth has reached the cap delegates further growth to a
//! freshly allocated child node rather than growing itself.
//!
//! A node's *global depth* is the number of hash bits consumed by every
//! ancestor plus its own `local_depth`; a bucket reached through a node is
//! never deeper than that node's global depth, by construction (every time
//! growth would exceed it, a node split or a new child node absorbs the
//! extra bit before the bucket is allowed to grow further).
//!
//! This module speaks in slots and node indices only; it never loads a
//! bucket's contents — that is the operation engine's job, coordinating
//! this module with the bucket store.

use crate::{err_at, error::Result};

/// Tag bit marking a packed slot as a child-node reference rather than a
/// bucket pointer.
const HIGH_BIT: u64 = 1 << 63;

/// Sentinel node index for "never allocated" / end of tombstone chain.
pub const NIL_NODE: i32 = -1;

/// A directory slot, as held decoded. Packs to/from a `u64` for the form
/// the state store persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Never written; routing through here is a bug.
    Empty,
    /// Resolves to a bucket at `(page_index, file_level)`.
    Bucket { page_index: u64, file_level: u8 },
    /// Delegates to another directory node.
    Child { node_index: u32, item_offset: u8 },
}

impl Slot {
    pub fn pack(self) -> u64 {
        match self {
            Slot::Empty => 0,
            Slot::Bucket { page_index, file_level } => ((page_index + 1) << 8) | file_level as u64,
            Slot::Child { node_index, item_offset } => {
                ((node_index as u64) << 8) | item_offset as u64 | HIGH_BIT
            }
        }
    }

    pub fn unpack(raw: u64) -> Slot {
        if raw == 0 {
            Slot::Empty
        } else if raw & HIGH_BIT != 0 {
            let raw = raw & !HIGH_BIT;
            Slot::Child {
                node_index: (raw >> 8) as u32,
                item_offset: (raw & 0xff) as u8,
            }
        } else {
            Slot::Bucket {
                page_index: (raw >> 8) - 1,
                file_level: (raw & 0xff) as u8,
            }
        }
    }
}

/// A bucket pointer, the `Slot::Bucket` payload lifted out on its own for
/// callers that only care about routing to a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketPointer {
    pub page_index: u64,
    pub file_level: u8,
}

impl BucketPointer {
    fn to_slot(self) -> Slot {
        Slot::Bucket {
            page_index: self.page_index,
            file_level: self.file_level,
        }
    }
}

/// One directory node: `slots.len() == 2^local_depth`, always a power of
/// two up to [`MAX_LEVEL_SIZE`][crate::options::MAX_LEVEL_SIZE].
#[derive(Clone, Debug)]
struct DirNode {
    slots: Vec<u64>,
    local_depth: u8,
}

impl DirNode {
    fn leaf(pointer: BucketPointer) -> DirNode {
        DirNode {
            slots: vec![pointer.to_slot().pack()],
            local_depth: 0,
        }
    }

    /// `pointers.len()` must be a power of two; the root's local depth is
    /// derived from it rather than taken from the configured maximum, so
    /// a directory can be seeded with fewer than `2^max_level_depth`
    /// initial buckets (useful in tests; production callers seed exactly
    /// `2^max_level_depth`.
    fn root(pointers: Vec<BucketPointer>) -> DirNode {
        let local_depth = (usize::BITS - (pointers.len() - 1).leading_zeros()) as u8;
        DirNode {
            slots: pointers.into_iter().map(|p| p.to_slot().pack()).collect(),
            local_depth,
        }
    }
}

enum NodeSlot {
    Empty,
    Tombstone { next: i32 },
    Live(DirNode),
}

/// Path taken while resolving a hash to a bucket pointer: full ancestry
/// (root to leaf) plus the slot that held the resolved pointer.
#[derive(Clone, Debug)]
pub struct BucketPath {
    /// Node indices from root to the leaf holding the resolved pointer.
    pub chain: Vec<u32>,
    /// Slot index within the leaf node.
    pub slot_index: usize,
    /// Hash bits consumed by every ancestor of the leaf.
    pub node_base_depth: u8,
    /// The leaf node's own local depth.
    pub local_depth: u8,
    pub pointer: BucketPointer,
    /// The hash that was resolved to reach this path; range-scan hops
    /// re-derive a neighboring prefix from this rather than from
    /// per-ancestor slot indices, which this path does not retain.
    pub hash: u64,
}

impl BucketPath {
    pub fn leaf(&self) -> u32 {
        *self.chain.last().expect("chain always has at least the root")
    }

    pub fn global_depth(&self) -> u8 {
        self.node_base_depth + self.local_depth
    }
}

/// The directory tree itself: a growable arena of nodes with a tombstone
/// free-list (the same reused-index pattern the bucket store uses for
/// freed pages), rooted at index 0.
pub struct Directory {
    nodes: Vec<NodeSlot>,
    tombstone_head: i32,
    max_level_depth: u8,
}

impl Directory {
    /// A fresh directory whose root routes directly to `initial_buckets`
    /// bucket pointers at file level 0.
    pub fn new(max_level_depth: u8, initial_buckets: Vec<BucketPointer>) -> Directory {
        Directory {
            nodes: vec![NodeSlot::Live(DirNode::root(initial_buckets))],
            tombstone_head: NIL_NODE,
            max_level_depth,
        }
    }

    /// Rebuild a directory from persisted node records.
    /// `raw_nodes[i]` is `None` for a never-allocated slot, `Some((depth,
    /// slots))` for a live node; tombstoned slots are folded into the
    /// chain separately via `tombstones`.
    pub fn from_parts(
        max_level_depth: u8,
        raw_nodes: Vec<Option<(u8, Vec<u64>)>>,
        tombstones: Vec<(usize, i32)>,
        tombstone_head: i32,
    ) -> Directory {
        let mut nodes: Vec<NodeSlot> = raw_nodes
            .into_iter()
            .map(|n| match n {
                Some((local_depth, slots)) => NodeSlot::Live(DirNode { slots, local_depth }),
                None => NodeSlot::Empty,
            })
            .collect();
        for (idx, next) in tombstones {
            nodes[idx] = NodeSlot::Tombstone { next };
        }
        Directory {
            nodes,
            tombstone_head,
            max_level_depth,
        }
    }

    /// Count of currently live nodes, for diagnostics.
    pub fn live_node_count(&self) -> u64 {
        self.nodes.iter().filter(|slot| matches!(slot, NodeSlot::Live(_))).count() as u64
    }

    /// Exported form for persistence: one entry per node index, `None` for
    /// never-allocated, tombstones reported separately.
    pub fn to_parts(&self) -> (Vec<Option<(u8, Vec<u64>)>>, Vec<(usize, i32)>, i32) {
        let mut raw = Vec::with_capacity(self.nodes.len());
        let mut tombstones = Vec::new();
        for (idx, slot) in self.nodes.iter().enumerate() {
            match slot {
                NodeSlot::Empty => raw.push(None),
                NodeSlot::Tombstone { next } => {
                    tombstones.push((idx, *next));
                    raw.push(None);
                }
                NodeSlot::Live(node) => raw.push(Some((node.local_depth, node.slots.clone()))),
            }
        }
        (raw, tombstones, self.tombstone_head)
    }

    fn node(&self, index: u32) -> Result<&DirNode> {
        match self.nodes.get(index as usize) {
            Some(NodeSlot::Live(node)) => Ok(node),
            _ => err_at!(Corruption, msg: "directory node {} is not live", index),
        }
    }

    fn node_mut(&mut self, index: u32) -> Result<&mut DirNode> {
        match self.nodes.get_mut(index as usize) {
            Some(NodeSlot::Live(node)) => Ok(node),
            _ => err_at!(Corruption, msg: "directory node {} is not live", index),
        }
    }

    fn alloc_node(&mut self, node: DirNode) -> u32 {
        if self.tombstone_head != NIL_NODE {
            let idx = self.tombstone_head as usize;
            let next = match self.nodes[idx] {
                NodeSlot::Tombstone { next } => next,
                _ => unreachable!("tombstone chain points at a non-tombstone slot"),
            };
            self.tombstone_head = next;
            self.nodes[idx] = NodeSlot::Live(node);
            idx as u32
        } else {
            self.nodes.push(NodeSlot::Live(node));
            (self.nodes.len() - 1) as u32
        }
    }

    fn free_node(&mut self, index: u32) {
        self.nodes[index as usize] = NodeSlot::Tombstone { next: self.tombstone_head };
        self.tombstone_head = index as i32;
    }

    /// Resolve `hash` to a bucket pointer, walking from the root and
    /// consuming `local_depth` bits per node hop.
    pub fn resolve(&self, hash: u64) -> Result<BucketPath> {
        let mut chain = vec![0u32];
        let mut node_index = 0u32;
        let mut consumed = 0u8;

        loop {
            let node = self.node(node_index)?;
            if consumed as u32 + node.local_depth as u32 > 64 {
                return err_at!(Corruption, msg: "directory walk exceeded 64 hash bits");
            }
            let slot_index = Self::slot_index(hash, consumed, node.local_depth);
            match Slot::unpack(node.slots[slot_index]) {
                Slot::Empty => return err_at!(Corruption, msg: "routed to an empty directory slot"),
                Slot::Bucket { page_index, file_level } => {
                    return Ok(BucketPath {
                        chain,
                        slot_index,
                        node_base_depth: consumed,
                        local_depth: node.local_depth,
                        pointer: BucketPointer { page_index, file_level },
                        hash,
                    });
                }
                Slot::Child { node_index: child, .. } => {
                    consumed += node.local_depth;
                    node_index = child;
                    chain.push(node_index);
                }
            }
        }
    }

    /// The `local_depth`-bit window of `hash` starting right after
    /// `consumed` bits, used as a node's slot index.
    fn slot_index(hash: u64, consumed: u8, local_depth: u8) -> usize {
        if local_depth == 0 {
            return 0;
        }
        let shift = 64u32.saturating_sub(consumed as u32 + local_depth as u32);
        ((hash >> shift) & ((1u64 << local_depth) - 1)) as usize
    }

    /// Publish a bucket split: `path` is the resolve-time path to the
    /// bucket that split, `updated` is its pointer (at `new_depth`,
    /// same page/level or not, per the caller), `new` is the newly
    /// allocated sibling's pointer. Implements three cases: in-leaf
    /// rewrite, in-place node split, and new-level-node creation. Returns
    /// `true` when the node itself grew or a new one was allocated (cases
    /// 2/3), `false` for a plain in-leaf pointer rewrite (case 1), so the
    /// caller can tell a bucket split from a node split for logging and
    /// metrics.
    pub fn publish_split(
        &mut self,
        path: &BucketPath,
        new_depth: u8,
        updated: BucketPointer,
        new: BucketPointer,
    ) -> Result<bool> {
        let leaf = path.leaf();
        let node_global_depth = path.global_depth();

        if new_depth <= node_global_depth {
            // Case 1: the node already has enough bits; the bucket's old
            // span inside this node (the run of slots sharing its old
            // pointer) splits in place into two halves.
            let node = self.node_mut(leaf)?;
            let old_packed = path.pointer.to_slot().pack();
            let span = 1usize << (node_global_depth - (new_depth - 1));
            let start = path.slot_index - (path.slot_index % span);
            let half = span / 2;
            for (i, slot) in node.slots[start..start + span].iter_mut().enumerate() {
                if *slot != old_packed {
                    return err_at!(Corruption, msg: "split span slot does not match old bucket pointer");
                }
                *slot = if i < half {
                    updated.to_slot().pack()
                } else {
                    new.to_slot().pack()
                };
            }
            return Ok(false);
        }

        if path.local_depth < self.max_level_depth {
            // Case 2: the leaf node can still grow; double its slots,
            // duplicating every entry pairwise except the one that split.
            let old_packed = path.pointer.to_slot().pack();
            let node = self.node_mut(leaf)?;
            let mut doubled = Vec::with_capacity(node.slots.len() * 2);
            for slot in &node.slots {
                if *slot == old_packed {
                    doubled.push(updated.to_slot().pack());
                    doubled.push(new.to_slot().pack());
                } else {
                    doubled.push(*slot);
                    doubled.push(*slot);
                }
            }
            node.slots = doubled;
            node.local_depth += 1;
            return Ok(true);
        }

        // Case 3: the leaf is already at max local depth; allocate a new
        // child node holding exactly the split pair and rewrite the
        // single affected slot as a reference to it.
        let child = DirNode {
            slots: vec![updated.to_slot().pack(), new.to_slot().pack()],
            local_depth: 1,
        };
        let child_index = self.alloc_node(child);
        let node = self.node_mut(leaf)?;
        node.slots[path.slot_index] = Slot::Child {
            node_index: child_index,
            item_offset: path.slot_index as u8,
        }
        .pack();
        Ok(true)
    }

    /// Locate the buddy of the bucket resolved at `path` — the sibling
    /// produced alongside it by its most recent split, found by flipping
    /// the one routing bit that last grew its depth. `bucket_depth` is the
    /// depth recorded on the bucket itself
    /// (which may be less than `path.global_depth()` if it is still
    /// shared across a duplicated run of slots).
    pub fn find_buddy(&self, path: &BucketPath, bucket_depth: u8) -> Result<BucketPointer> {
        if bucket_depth == 0 {
            return err_at!(Corruption, msg: "bucket at depth 0 has no buddy");
        }
        let local_bit = bucket_depth - 1 - path.node_base_depth;
        if local_bit as u32 >= path.local_depth as u32 {
            return err_at!(
                Corruption,
                msg: "buddy routing bit {} falls outside leaf node's own window", local_bit
            );
        }
        let flip = 1usize << (path.local_depth - 1 - local_bit);
        let buddy_slot = path.slot_index ^ flip;

        let mut node_index = path.leaf();
        let mut slot_index = buddy_slot;
        loop {
            let node = self.node(node_index)?;
            match Slot::unpack(node.slots[slot_index]) {
                Slot::Bucket { page_index, file_level } => {
                    return Ok(BucketPointer { page_index, file_level })
                }
                Slot::Child { node_index: child, .. } => {
                    node_index = child;
                    slot_index = 0;
                }
                Slot::Empty => return err_at!(Corruption, msg: "buddy slot is empty"),
            }
        }
    }

    /// Publish a bucket merge: rewrite every slot in the leaf node that
    /// shares `path`'s bucket pointer or its buddy's, to `merged` — the
    /// inverse of [`Self::publish_split`]'s case 1/2. If this collapses the
    /// entire leaf node to a single uniform pointer and the leaf is not
    /// the root, the node is torn down and the parent's references to it
    /// rewritten in place. Returns `true` when a node was torn down,
    /// `false` for a plain in-leaf pointer rewrite.
    pub fn publish_merge(
        &mut self,
        path: &BucketPath,
        buddy_pointer: BucketPointer,
        merged: BucketPointer,
    ) -> Result<bool> {
        let leaf = path.leaf();
        {
            let node = self.node_mut(leaf)?;
            let a = path.pointer.to_slot().pack();
            let b = buddy_pointer.to_slot().pack();
            let merged_packed = merged.to_slot().pack();
            for slot in node.slots.iter_mut() {
                if *slot == a || *slot == b {
                    *slot = merged_packed;
                }
            }
        }

        if path.chain.len() < 2 {
            return Ok(false); // root never collapses into a parent.
        }
        let uniform = {
            let node = self.node(leaf)?;
            node.slots.windows(2).all(|w| w[0] == w[1])
        };
        if !uniform {
            return Ok(false);
        }

        let collapsed = self.node(leaf)?.slots[0];
        let parent_index = path.chain[path.chain.len() - 2];
        let parent = self.node_mut(parent_index)?;
        for slot in parent.slots.iter_mut() {
            if let Slot::Child { node_index, .. } = Slot::unpack(*slot) {
                if node_index == leaf {
                    *slot = collapsed;
                }
            }
        }
        self.free_node(leaf);
        Ok(true)
    }

    /// Next non-empty bucket pointer strictly after `after`, in hash
    /// order, by incrementing the (depth-bit) routing prefix and
    /// re-resolving. Returns `None` past the end of
    /// the key space.
    pub fn next_bucket(&self, after: &BucketPath) -> Result<Option<BucketPath>> {
        let depth = after.global_depth();
        if depth == 0 {
            return Ok(None);
        }
        let prefix = Self::prefix_of(after.hash, depth);
        let max_prefix = if depth >= 64 { u64::MAX } else { (1u64 << depth) - 1 };
        if prefix >= max_prefix {
            return Ok(None);
        }
        let next_hash = (prefix + 1) << (64 - depth as u32);
        Ok(Some(self.resolve(next_hash)?))
    }

    /// Previous non-empty bucket pointer strictly before `before`,
    /// mirroring [`Self::next_bucket`].
    pub fn prev_bucket(&self, before: &BucketPath) -> Result<Option<BucketPath>> {
        let depth = before.global_depth();
        if depth == 0 {
            return Ok(None);
        }
        let prefix = Self::prefix_of(before.hash, depth);
        if prefix == 0 {
            return Ok(None);
        }
        let prev_hash = (prefix - 1) << (64 - depth as u32);
        Ok(Some(self.resolve(prev_hash)?))
    }

    fn prefix_of(hash: u64, depth: u8) -> u64 {
        if depth >= 64 {
            hash
        } else {
            hash >> (64 - depth as u32)
        }
    }
}
