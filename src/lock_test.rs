use std::sync::Arc;

use super::*;

#[test]
fn test_single_reader() {
    let lock = RwSpinLock::new();
    let r = lock.acquire_read(16);
    assert_eq!(lock.stats().value & RwSpinLock::READERS_FLAG, 1);
    drop(r);
    assert_eq!(lock.stats().value, 0);
}

#[test]
fn test_write_then_release_allows_reader() {
    let lock = RwSpinLock::new();
    {
        let _w = lock.acquire_write(16);
        assert_ne!(lock.stats().value & RwSpinLock::LOCK_FLAG, 0);
    }
    let r = lock.acquire_read(16);
    drop(r);
}

#[test]
fn test_recursive_write_reentry() {
    let lock = RwSpinLock::new();
    let outer = lock.acquire_write(16);
    // A nested acquire on the same thread must not deadlock.
    let inner = lock.acquire_write(16);
    drop(inner);
    // Lock is still held after the inner guard drops.
    assert_ne!(lock.stats().value & RwSpinLock::LOCK_FLAG, 0);
    drop(outer);
    assert_eq!(lock.stats().value, 0);
}

#[test]
fn test_concurrent_readers_and_writer_exclusion() {
    let lock = Arc::new(RwSpinLock::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let lock = Arc::clone(&lock);
        handles.push(std::thread::spawn(move || {
            for _ in 0..200 {
                {
                    let _w = lock.acquire_write(8);
                }
                {
                    let _r = lock.acquire_read(8);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(lock.stats().value, 0);
}
