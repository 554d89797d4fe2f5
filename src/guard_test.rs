use std::sync::Arc;

use super::*;

#[test]
fn test_read_write_roundtrip() {
    let cell = RwGuarded::new(vec![1, 2, 3]);
    {
        let mut w = cell.write(16);
        w.push(4);
    }
    let r = cell.read(16);
    assert_eq!(*r, vec![1, 2, 3, 4]);
}

#[test]
fn test_concurrent_writers_serialize() {
    let cell = Arc::new(RwGuarded::new(0u64));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let cell = Arc::clone(&cell);
        handles.push(std::thread::spawn(move || {
            for _ in 0..500 {
                let mut w = cell.write(8);
                *w += 1;
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(*cell.read(8), 4000);
}
