//! Tail marker for the tree-state file: written after every other field
//! so a reopen can tell a cleanly closed file from one cut off mid-write.

use lazy_static::lazy_static;

lazy_static! {
    pub static ref TREE_STATE_MARKER: Vec<u8> = b"exhash-tree-state-v1".to_vec();
}
