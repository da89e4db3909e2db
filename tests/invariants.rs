// Randomized invariant/law suite driven by a small seeded PRNG. No
// proptest/quickcheck dependency — deterministic xorshift64 is enough to
// exercise grow/shrink/tombstone-reuse across thousands of operations
// without pulling in a fuzzing crate the rest of this pack never reaches
// for.

use grouphash::GroupHash;
use std::collections::HashMap as StdHashMap;

struct Xorshift64(u64);

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn next_key(&mut self, range: i64) -> i64 {
        (self.next_u64() % range as u64) as i64
    }
}

/// I1: `len()` equals the number of Valid meta bytes — checked indirectly
/// by cross-referencing against a reference multiset.
/// I4: `len() <= capacity*15/16`, and `capacity > 16 => len() >= capacity*7/16`.
fn assert_load_factor_invariants<K, V, S>(table: &GroupHash<K, V, S>)
where
    K: std::hash::Hash + Eq,
    S: std::hash::BuildHasher,
{
    let capacity = table.capacity();
    assert!(capacity >= 16);
    assert_eq!(capacity % 16, 0);
    assert!(table.len() <= capacity * 15 / 16);
    if capacity > 16 {
        assert!(table.len() >= capacity * 7 / 16);
    }
}

#[test]
fn randomized_mutation_sequence_preserves_invariants_and_laws() {
    let mut table: GroupHash<i64, i64> = GroupHash::new();
    let mut reference: Vec<(i64, i64)> = Vec::new();
    let mut rng = Xorshift64::new(0xA5A5_1234_BEEF_0001);

    for _ in 0..20_000 {
        match rng.next_u64() % 4 {
            0 => {
                let key = rng.next_key(500);
                let value = rng.next_key(1000);
                table.insert(key, value);
                reference.push((key, value));
            }
            1 => {
                let key = rng.next_key(500);
                let removed_count = table.count(&key);
                let expected_removed = reference.iter().filter(|(k, _)| *k == key).count();
                assert_eq!(removed_count as usize, expected_removed);

                let actually_removed = table.remove(&key);
                assert_eq!(actually_removed, expected_removed);
                reference.retain(|(k, _)| *k != key);
                assert!(!table.contains(&key)); // L2
            }
            2 => {
                let key = rng.next_key(500);
                let old_value = rng.next_key(1000);
                let new_value = rng.next_key(1000);
                table.replace_with_old(&key, &old_value, new_value);
                if let Some(slot) = reference.iter_mut().find(|(k, v)| *k == key && *v == old_value) {
                    slot.1 = new_value;
                }
            }
            _ => {
                let key = rng.next_key(500);
                let expected = reference.iter().filter(|(k, _)| *k == key).count();
                assert_eq!(table.count(&key), expected); // consistency check, no mutation
            }
        }

        assert_load_factor_invariants(&table);
        assert_eq!(table.len(), reference.len()); // I1 (observable form)
    }

    // L6: values(k).len() == count(k) for every key ever touched.
    let mut touched: Vec<i64> = reference.iter().map(|(k, _)| *k).collect();
    touched.sort_unstable();
    touched.dedup();
    for key in touched {
        assert_eq!(table.values(&key).len(), table.count(&key));
    }

    // Final content equality as multisets (order-independent).
    let mut expected_counts: StdHashMap<(i64, i64), usize> = StdHashMap::new();
    for pair in &reference {
        *expected_counts.entry(*pair).or_insert(0) += 1;
    }
    let mut actual_counts: StdHashMap<(i64, i64), usize> = StdHashMap::new();
    for (k, v) in table.iter() {
        *actual_counts.entry((*k, *v)).or_insert(0) += 1;
    }
    assert_eq!(expected_counts, actual_counts);
}

/// L1: insert then find yields a slot with that key; N inserts of the same
/// key yields count(k) == N.
#[test]
fn repeated_inserts_of_same_key_accumulate() {
    let mut table: GroupHash<&str, i32> = GroupHash::new();
    for i in 0..25 {
        table.insert("dup", i);
    }
    assert_eq!(table.count(&"dup"), 25);
    assert!(table.contains(&"dup"));
}

/// L3: replace(k, v) implies value(k, _) yields v for some slot.
#[test]
fn replace_overwrites_one_slot_value() {
    let mut table: GroupHash<i32, i32> = GroupHash::new();
    table.insert(7, 1);
    table.insert(7, 2);
    table.replace(&7, 99);
    assert_eq!(table.values(&7).into_iter().filter(|v| *v == 99).count(), 1);
}

/// L4: clear() produces the same observable state as a fresh table.
#[test]
fn clear_resets_to_fresh_state() {
    let mut table: GroupHash<i32, i32> = GroupHash::new();
    for k in 0..200 {
        table.insert(k, k);
    }
    table.clear();
    let fresh: GroupHash<i32, i32> = GroupHash::new();
    assert_eq!(table.len(), fresh.len());
    assert_eq!(table.capacity(), fresh.capacity());
    assert!(!table.contains(&5));
    assert_eq!(table.iter().count(), 0);
}

/// L5: iteration visits each Valid slot exactly once, none Empty/Deleted.
#[test]
fn iteration_is_exhaustive_and_exact() {
    let mut table: GroupHash<i32, i32> = GroupHash::new();
    let mut expected: Vec<i32> = Vec::new();
    for k in 0..150 {
        table.insert(k, k);
        expected.push(k);
    }
    for k in (0..150).step_by(5) {
        table.remove(&k);
        expected.retain(|&x| x != k);
    }

    let mut seen: Vec<i32> = table.iter().map(|(k, _)| *k).collect();
    seen.sort_unstable();
    expected.sort_unstable();
    assert_eq!(seen, expected);
    assert_eq!(seen.len(), table.len());
}

/// L7: resize preserves content exactly across grow and shrink.
#[test]
fn resize_round_trip_preserves_multiset() {
    let mut table: GroupHash<i32, i32> = GroupHash::new();
    for k in 0..400 {
        table.insert(k, k * 3);
    }
    for k in (0..400).step_by(2) {
        table.remove(&k);
    }
    for k in (0..400).step_by(2) {
        table.insert(k, k * 3);
    }

    let mut seen: Vec<(i32, i32)> = table.iter().map(|(k, v)| (*k, *v)).collect();
    seen.sort_unstable();
    let mut expected: Vec<(i32, i32)> = (0..400).map(|k| (k, k * 3)).collect();
    expected.sort_unstable();
    assert_eq!(seen, expected);
}

/// Boundary: inserting the 15th then 16th element into a fresh 16-slot
/// table triggers grow.
#[test]
fn sixteenth_insert_triggers_grow() {
    let mut table: GroupHash<i32, i32> = GroupHash::new();
    for k in 0..15 {
        table.insert(k, k);
    }
    assert_eq!(table.capacity(), 16);
    table.insert(15, 15);
    assert!(table.capacity() > 16);
}

/// Boundary: 17 keys sharing H1 (identity-ish hash via small ints spilling
/// into one group) still all land and are all findable.
#[test]
fn seventeen_colliding_keys_spill_to_next_group() {
    let mut table: GroupHash<i32, i32> = GroupHash::new();
    // All multiples of 16 collide on H1 in a 16-capacity table.
    let keys: Vec<i32> = (0..17).map(|i| i * 16).collect();
    for &k in &keys {
        table.insert(k, k);
    }
    assert_eq!(table.len(), 17);
    for &k in &keys {
        assert!(table.contains(&k));
    }
}

/// Boundary: shrink never drops capacity below GROUP_SIZE (16).
#[test]
fn shrink_never_goes_below_initial_capacity() {
    let mut table: GroupHash<i32, i32> = GroupHash::new();
    for k in 0..4 {
        table.insert(k, k);
    }
    for k in 0..4 {
        table.remove(&k);
    }
    assert_eq!(table.capacity(), 16);
    assert_eq!(table.len(), 0);
}

/// Scenario: from_pairs / FromIterator preserve duplicates and round-trip
/// through removal and reinsertion without corruption.
#[test]
fn from_iterator_then_mutate_stays_consistent() {
    let pairs: Vec<(i32, i32)> = (0..64).map(|i| (i % 10, i)).collect();
    let mut table: GroupHash<i32, i32> = pairs.into_iter().collect();
    assert_eq!(table.len(), 64);
    assert_eq!(table.count(&3), 7); // i in {3,13,...,63} map to key 3 mod 10
    let before = table.values(&3);
    assert_eq!(before.len(), 7);
    table.remove(&3);
    assert!(!table.contains(&3));
    assert_eq!(table.count(&3), 0);
}
