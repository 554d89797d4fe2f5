use std::ffi::OsStr;

use super::*;
use crate::{cache::MemPageCache, codec::U64Codec, hash::CityHasher, metrics::NullMetrics};

fn new_index(dir: &std::path::Path, name: &str) -> HashIndex<u64, u64, MemPageCache> {
    let mut options = IndexOptions::new(dir.as_os_str(), name);
    options.set_level_depth(4);
    options.set_bucket_size(256);
    let cache = MemPageCache::new(256);
    HashIndex::create(
        options,
        cache,
        Box::new(CityHasher::new()),
        Box::new(U64Codec),
        Box::new(U64Codec),
        Box::new(NullMetrics),
    )
    .unwrap()
}

#[test]
fn test_create_put_get_remove() {
    let index = new_index(std::path::Path::new("/tmp"), "facade-test-basic");

    assert_eq!(index.get(&1).unwrap(), None);
    index.put(1, 100).unwrap();
    index.put(2, 200).unwrap();
    assert_eq!(index.get(&1).unwrap(), Some(100));
    assert_eq!(index.get(&2).unwrap(), Some(200));
    assert_eq!(index.len(), 2);

    assert!(index.remove(&1).unwrap());
    assert_eq!(index.get(&1).unwrap(), None);
    assert!(!index.remove(&1).unwrap());
    assert_eq!(index.len(), 1);
}

#[test]
fn test_range_entries_are_consistent_with_len() {
    let index = new_index(std::path::Path::new("/tmp"), "facade-test-range");
    for i in 0..30u64 {
        index.put(i, i).unwrap();
    }

    let higher = index.higher_entries(&0).unwrap();
    assert_eq!(higher.len() as u64, index.len() - 1);

    let ceiling = index.ceiling_entries(&0).unwrap();
    assert_eq!(ceiling.len() as u64, index.len());

    let lower = index.lower_entries(&29).unwrap();
    assert_eq!(lower.len() as u64, index.len() - 1);

    let floor = index.floor_entries(&29).unwrap();
    assert_eq!(floor.len() as u64, index.len());
}

#[test]
fn test_stats_reports_records_and_buckets() {
    let index = new_index(std::path::Path::new("/tmp"), "facade-test-stats");
    for i in 0..200u64 {
        index.put(i, i).unwrap();
    }
    for i in 0..150u64 {
        index.remove(&i).unwrap();
    }

    let stats = index.stats().unwrap();
    assert_eq!(stats.records_count, 50);
    assert_eq!(stats.records_count, index.len());
    assert!(stats.node_count >= 1);
    assert!(!stats.buckets_per_level.is_empty());
    assert!(stats.buckets_per_level.values().sum::<u64>() > 0);
}

#[test]
fn test_close_and_reopen_preserves_entries() {
    let dir = std::env::temp_dir();
    let name = "facade-test-reopen";
    // Clean up any state left behind by a prior run in this shared /tmp.
    let _ = std::fs::remove_file(dir.join(format!("{}.metadata", name)));
    let _ = std::fs::remove_file(dir.join(format!("{}.treestate", name)));
    let _ = std::fs::remove_file(dir.join(format!("{}.bucket.0", name)));

    let mut options = IndexOptions::new(OsStr::new(dir.to_str().unwrap()), name);
    options.set_level_depth(4);
    options.set_bucket_size(256);
    let cache = crate::cache::FilePageCache::new(&dir, name, options.max_bucket_size_bytes);

    let index = HashIndex::create(
        options.clone(),
        cache,
        Box::new(CityHasher::new()) as Box<dyn KeyHasher<u64> + Send + Sync>,
        Box::new(U64Codec) as Box<dyn Codec<u64> + Send + Sync>,
        Box::new(U64Codec) as Box<dyn Codec<u64> + Send + Sync>,
        Box::new(NullMetrics),
    )
    .unwrap();
    for i in 0..10u64 {
        index.put(i, i * 7).unwrap();
    }
    index.close().unwrap();

    let cache = crate::cache::FilePageCache::new(&dir, name, options.max_bucket_size_bytes);
    let reopened = HashIndex::open(
        options,
        cache,
        Box::new(CityHasher::new()) as Box<dyn KeyHasher<u64> + Send + Sync>,
        Box::new(U64Codec) as Box<dyn Codec<u64> + Send + Sync>,
        Box::new(U64Codec) as Box<dyn Codec<u64> + Send + Sync>,
        Box::new(NullMetrics),
    )
    .unwrap();
    assert_eq!(reopened.len(), 10);
    for i in 0..10u64 {
        assert_eq!(reopened.get(&i).unwrap(), Some(i * 7));
    }

    let _ = std::fs::remove_file(dir.join(format!("{}.metadata", name)));
    let _ = std::fs::remove_file(dir.join(format!("{}.treestate", name)));
    let _ = std::fs::remove_file(dir.join(format!("{}.bucket.0", name)));
}

#[test]
fn test_reopen_rejects_mismatched_options() {
    let dir = std::env::temp_dir();
    let name = "facade-test-mismatch";
    let _ = std::fs::remove_file(dir.join(format!("{}.metadata", name)));
    let _ = std::fs::remove_file(dir.join(format!("{}.treestate", name)));
    let _ = std::fs::remove_file(dir.join(format!("{}.bucket.0", name)));

    let mut options = IndexOptions::new(OsStr::new(dir.to_str().unwrap()), name);
    options.set_level_depth(4);
    options.set_bucket_size(256);
    let cache = crate::cache::FilePageCache::new(&dir, name, options.max_bucket_size_bytes);
    let index = HashIndex::create(
        options.clone(),
        cache,
        Box::new(CityHasher::new()) as Box<dyn KeyHasher<u64> + Send + Sync>,
        Box::new(U64Codec) as Box<dyn Codec<u64> + Send + Sync>,
        Box::new(U64Codec) as Box<dyn Codec<u64> + Send + Sync>,
        Box::new(NullMetrics),
    )
    .unwrap();
    index.close().unwrap();

    let mut mismatched = options.clone();
    mismatched.set_bucket_size(512);
    let cache = crate::cache::FilePageCache::new(&dir, name, mismatched.max_bucket_size_bytes);
    let err = HashIndex::<u64, u64, _>::open(
        mismatched,
        cache,
        Box::new(CityHasher::new()) as Box<dyn KeyHasher<u64> + Send + Sync>,
        Box::new(U64Codec) as Box<dyn Codec<u64> + Send + Sync>,
        Box::new(U64Codec) as Box<dyn Codec<u64> + Send + Sync>,
        Box::new(NullMetrics),
    )
    .unwrap_err();
    assert!(matches!(err, crate::error::Error::Configuration(_)));

    let _ = std::fs::remove_file(dir.join(format!("{}.metadata", name)));
    let _ = std::fs::remove_file(dir.join(format!("{}.treestate", name)));
    let _ = std::fs::remove_file(dir.join(format!("{}.bucket.0", name)));
}
