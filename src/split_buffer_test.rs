use super::*;
use crate::{cache::MemPageCache, codec::U64Codec};

fn codecs() -> (U64Codec, U64Codec) {
    (U64Codec, U64Codec)
}

#[test]
fn test_stage_and_get_before_drain() {
    let mut buf: SplitBuffer<u64, u64> = SplitBuffer::new(4);
    let bucket = Bucket::empty(9, 1);
    buf.stage(0, 3, bucket);
    assert!(buf.get(0, 3).is_some());
    assert_eq!(buf.len(), 1);
}

#[test]
fn test_over_threshold() {
    let mut buf: SplitBuffer<u64, u64> = SplitBuffer::new(2);
    for i in 0..3 {
        buf.stage(0, i, Bucket::empty(9, 1));
    }
    assert!(buf.over_threshold());
}

#[test]
fn test_drain_writes_through_and_clears() {
    let (kc, vc) = codecs();
    let store = BucketStore::new(MemPageCache::new(256), 256);
    store.cache().allocate(0).unwrap();
    store.cache().allocate(0).unwrap();

    let mut buf: SplitBuffer<u64, u64> = SplitBuffer::new(10);
    let mut bucket = Bucket::empty(9, 1);
    bucket.add_entry(1, 100, &kc, &vc, 256).unwrap();
    buf.stage(0, 1, bucket);

    buf.drain(&store, &kc, &vc).unwrap();
    assert!(buf.is_empty());

    let reloaded = store.load::<u64, u64>(0, 1, &kc, &vc).unwrap();
    assert_eq!(reloaded.find(&1), Some(&100));
}
