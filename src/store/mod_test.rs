use super::*;
use crate::{cache::MemPageCache, codec::U64Codec};

fn codecs() -> (U64Codec, U64Codec) {
    (U64Codec, U64Codec)
}

#[test]
fn test_seed_and_load() {
    let (kc, vc) = codecs();
    let mut store = BucketStore::new(MemPageCache::new(256), 256);
    store.seed_level_zero::<u64, u64>(4, 8, 1, &kc, &vc).unwrap();
    assert_eq!(store.buckets_count(0), 4);

    let bucket = store.load::<u64, u64>(0, 2, &kc, &vc).unwrap();
    assert_eq!(bucket.depth(), 8);
    assert!(bucket.is_empty());
}

#[test]
fn test_allocate_pair_grows_file_without_tombstones() {
    let (kc, vc) = codecs();
    let mut store: BucketStore<MemPageCache> = BucketStore::new(MemPageCache::new(256), 256);
    let (a, b) = store.allocate_pair::<u64, u64>(1, &kc, &vc).unwrap();
    assert_eq!((a, b), (0, 1));
    assert_eq!(store.buckets_count(1), 2);
}

#[test]
fn test_free_and_reuse_tombstone() {
    let (kc, vc) = codecs();
    let mut store = BucketStore::new(MemPageCache::new(256), 256);
    store.seed_level_zero::<u64, u64>(4, 8, 1, &kc, &vc).unwrap();

    store.free_page::<u64, u64>(0, 2, &kc, &vc).unwrap();
    assert_eq!(store.buckets_count(0), 3);

    let freed = store.load::<u64, u64>(0, 2, &kc, &vc).unwrap();
    assert_eq!(freed.next_removed_bucket_pair(), NIL);

    let (first, _second) = store.allocate_pair::<u64, u64>(0, &kc, &vc).unwrap();
    assert_eq!(first, 2);
}

#[test]
fn test_level_for_depth() {
    assert_eq!(BucketStore::<MemPageCache>::level_for_depth(8, 8).unwrap(), 0);
    assert_eq!(BucketStore::<MemPageCache>::level_for_depth(10, 8).unwrap(), 2);
    assert!(BucketStore::<MemPageCache>::level_for_depth(3, 8).is_err());
}
