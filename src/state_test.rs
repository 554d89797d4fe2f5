use std::collections::HashMap;

use super::*;
use crate::directory::BucketPointer;

fn tmp_dir(label: &str) -> ffi::OsString {
    let path = std::env::temp_dir().join(format!("exhash-state-test-{}-{}", label, std::process::id()));
    std::fs::create_dir_all(&path).unwrap();
    path.into_os_string()
}

#[test]
fn test_metadata_roundtrip() {
    let dir = tmp_dir("metadata");
    let options = PersistedOptions { max_bucket_size_bytes: 4096, max_level_depth: 8 };
    save_metadata(&dir, "idx", 42, 4096, &options).unwrap();

    let (records_count, page_size, loaded_options) = load_metadata(&dir, "idx").unwrap();
    assert_eq!(records_count, 42);
    assert_eq!(page_size, 4096);
    assert_eq!(loaded_options, options);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_tree_state_truncated_file_is_corruption() {
    let dir = tmp_dir("treestate-truncated");
    let directory = Directory::new(1, vec![BucketPointer { page_index: 0, file_level: 0 }, BucketPointer { page_index: 1, file_level: 0 }]);
    let mut levels = HashMap::new();
    levels.insert(0u8, (2u64, -1i64));
    save_tree_state(&dir, "idx", 8, &directory, &levels).unwrap();

    let path = tree_state_path(&dir, "idx");
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    let err = load_tree_state(&dir, "idx").unwrap_err();
    assert!(matches!(err, crate::error::Error::Corruption(_)));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_tree_state_roundtrip() {
    let dir = tmp_dir("treestate");
    let directory = Directory::new(
        1,
        vec![
            BucketPointer { page_index: 0, file_level: 0 },
            BucketPointer { page_index: 1, file_level: 0 },
        ],
    );
    let mut levels = HashMap::new();
    levels.insert(0u8, (2u64, -1i64));

    save_tree_state(&dir, "idx", 8, &directory, &levels).unwrap();
    let (max_level_depth, loaded_directory, loaded_levels) = load_tree_state(&dir, "idx").unwrap();

    assert_eq!(max_level_depth, 8);
    assert_eq!(loaded_levels, levels);
    assert_eq!(
        loaded_directory.resolve(0x8000_0000_0000_0000).unwrap().pointer,
        BucketPointer { page_index: 1, file_level: 0 }
    );

    std::fs::remove_dir_all(&dir).ok();
}
