use super::*;

#[test]
fn test_cityhasher_deterministic() {
    let bh = CityHasher::new();
    let a = bh.hash_key("same-key");
    let b = bh.hash_key("same-key");
    assert_eq!(a, b);
}

#[test]
fn test_cityhasher_distinguishes_keys() {
    let bh = CityHasher::new();
    let a = bh.hash_key("key-one");
    let b = bh.hash_key("key-two");
    assert_ne!(a, b);
}

#[test]
fn test_cityhasher_u64_keys() {
    let bh = CityHasher::new();
    let mut seen = std::collections::HashSet::new();
    for k in 0u64..2000 {
        seen.insert(bh.hash_key(&k));
    }
    // Collisions should be rare for a decent hash over small sequential ints.
    assert!(seen.len() > 1990);
}
