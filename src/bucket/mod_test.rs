use super::*;
use crate::codec::U64Codec;

fn codecs() -> (U64Codec, U64Codec) {
    (U64Codec, U64Codec)
}

#[test]
fn test_add_find_update_delete() {
    let (kc, vc) = codecs();
    let mut b: Bucket<u64, u64> = Bucket::empty(8, 1);

    assert!(b.add_entry(10, 100, &kc, &vc, 4096).unwrap());
    assert!(b.add_entry(5, 50, &kc, &vc, 4096).unwrap());
    assert!(b.add_entry(20, 200, &kc, &vc, 4096).unwrap());

    assert_eq!(b.find(&10), Some(&100));
    assert_eq!(b.find(&999), None);

    // sorted order preserved
    let keys: Vec<u64> = b.entries().iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, vec![5, 10, 20]);

    // update existing key
    assert!(b.add_entry(10, 111, &kc, &vc, 4096).unwrap());
    assert_eq!(b.find(&10), Some(&111));
    assert_eq!(b.len(), 3);

    let idx = b.index_of(&5).unwrap();
    let (k, v) = b.delete_entry(idx);
    assert_eq!((k, v), (5, 50));
    assert_eq!(b.len(), 2);
}

#[test]
fn test_add_entry_respects_capacity() {
    let (kc, vc) = codecs();
    let mut b: Bucket<u64, u64> = Bucket::empty(8, 1);
    // header + 1 split-history slot is PAGE_HEADER + 8; each entry is 16 bytes.
    let small_page = PAGE_HEADER_BYTES + 8 + 16;
    assert!(b.add_entry(1, 1, &kc, &vc, small_page).unwrap());
    assert!(!b.add_entry(2, 2, &kc, &vc, small_page).unwrap());
}

#[test]
fn test_page_roundtrip() {
    let (kc, vc) = codecs();
    let mut b: Bucket<u64, u64> = Bucket::empty(9, 2);
    b.set_split_history(0, 7);
    b.set_split_history(1, 3);
    b.set_next_removed_bucket_pair(42);
    for k in [1u64, 2, 3, 1000] {
        b.add_entry(k, k * 10, &kc, &vc, 4096).unwrap();
    }

    let page = b.encode_page(&kc, &vc, 4096).unwrap();
    assert_eq!(page.len(), 4096);

    let b2: Bucket<u64, u64> = Bucket::decode_page(&page, &kc, &vc).unwrap();
    assert_eq!(b2.depth(), 9);
    assert_eq!(b2.split_history(0), 7);
    assert_eq!(b2.split_history(1), 3);
    assert_eq!(b2.next_removed_bucket_pair(), 42);
    assert_eq!(b2.entries(), b.entries());
}

#[test]
fn test_merged_size_predicts_append() {
    let (kc, vc) = codecs();
    let mut a: Bucket<u64, u64> = Bucket::empty(9, 1);
    let mut b: Bucket<u64, u64> = Bucket::empty(9, 1);
    a.add_entry(1, 1, &kc, &vc, 4096).unwrap();
    b.add_entry(2, 2, &kc, &vc, 4096).unwrap();

    let predicted = a.merged_size(&b, &kc, &vc);
    let mut merged = a.clone();
    merged.append_entry(2, 2);
    assert_eq!(predicted, merged.content_size(&kc, &vc));
}

#[test]
fn test_from_sorted_matches_incremental_build() {
    let (kc, vc) = codecs();
    let mut incremental: Bucket<u64, u64> = Bucket::empty(9, 2);
    for k in [1u64, 5, 10, 42] {
        incremental.add_entry(k, k * 2, &kc, &vc, 4096).unwrap();
    }

    let direct: Bucket<u64, u64> = Bucket::from_sorted(9, vec![(1, 2), (5, 10), (10, 20), (42, 84)], 2);
    assert_eq!(direct.entries(), incremental.entries());
    assert_eq!(direct.split_history(0), NIL);
    assert_eq!(direct.split_history(1), NIL);
    assert_eq!(direct.next_removed_bucket_pair(), NIL);
}

#[test]
fn test_check_bucket_depth() {
    let hash = 0xF0F0_0000_0000_0000u64;
    let prefix = hash >> (64 - 8);
    assert!(check_bucket_depth(hash, 8, prefix).is_ok());
    assert!(check_bucket_depth(hash, 8, prefix + 1).is_err());
}
