// Unit tests for the progressive hash map (hash.rs).
//
// Coverage:
//   - randomized insert/lookup/pop sequences match a reference map
//   - every key inserted before a forced resize stays reachable
//   - relocation work per operation is bounded
//   - for_each visits both tables during a resize

use std::collections::HashMap;

use minkv::hash::{fnv1a, HMap};

// Small deterministic generator so failures reproduce.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

fn key_bytes(n: u64) -> Vec<u8> {
    format!("key-{n}").into_bytes()
}

// ─────────────────────────────────────────────────────────────────────────────
// Reference-model equivalence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn randomized_ops_match_reference_map() {
    let mut rng = XorShift(0x9e3779b97f4a7c15);
    let mut map: HMap<(Vec<u8>, u64)> = HMap::new();
    let mut reference: HashMap<Vec<u8>, u64> = HashMap::new();

    for round in 0..20_000u64 {
        let key = key_bytes(rng.next() % 700);
        let hash = fnv1a(&key);
        match rng.next() % 4 {
            // Upsert.
            0 | 1 => {
                let value = round;
                if map.lookup_mut(hash, |item| item.0 == key).is_some() {
                    map.pop(hash, |item| item.0 == key);
                }
                map.insert(hash, (key.clone(), value));
                reference.insert(key, value);
            }
            // Pop.
            2 => {
                let mine = map.pop(hash, |item| item.0 == key).map(|item| item.1);
                let theirs = reference.remove(&key);
                assert_eq!(mine, theirs);
            }
            // Lookup.
            _ => {
                let mine = map.lookup(hash, |item| item.0 == key).map(|item| item.1);
                let theirs = reference.get(&key).copied();
                assert_eq!(mine, theirs);
            }
        }
        assert_eq!(map.len(), reference.len());
    }

    for (key, value) in &reference {
        let hash = fnv1a(key);
        let found = map.lookup(hash, |item| item.0 == *key).map(|item| item.1);
        assert_eq!(found, Some(*value));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resizing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn all_keys_survive_forced_resizes() {
    let mut map: HMap<(Vec<u8>, u64)> = HMap::new();
    // Far past several load-factor boundaries.
    for n in 0..5_000u64 {
        let key = key_bytes(n);
        map.insert(fnv1a(&key), (key, n));
    }
    assert_eq!(map.len(), 5_000);
    for n in 0..5_000u64 {
        let key = key_bytes(n);
        let found = map.lookup(fnv1a(&key), |item| item.0 == key);
        assert_eq!(found.map(|item| item.1), Some(n), "key {n} lost in resize");
    }
}

#[test]
fn relocation_work_per_op_is_bounded() {
    let mut map: HMap<(Vec<u8>, u64)> = HMap::new();
    let mut n = 0u64;
    // Grow until a resize leaves a large backlog of pending relocations.
    while map.pending_relocation() < 300 {
        let key = key_bytes(n);
        map.insert(fnv1a(&key), (key, n));
        n += 1;
        assert!(n < 100_000, "never accumulated a relocation backlog");
    }

    let before = map.pending_relocation();
    let probe = key_bytes(0);
    map.lookup(fnv1a(&probe), |item| item.0 == probe);
    let after = map.pending_relocation();
    assert_eq!(before - after, 128, "one operation must relocate exactly the work bound");
}

#[test]
fn for_each_sees_both_tables_mid_resize() {
    let mut map: HMap<u64> = HMap::new();
    let mut inserted = Vec::new();
    while map.pending_relocation() == 0 || inserted.len() < 600 {
        let n = inserted.len() as u64;
        map.insert(fnv1a(&n.to_le_bytes()), n);
        inserted.push(n);
        if inserted.len() > 100_000 {
            panic!("no resize ever started");
        }
    }
    let mut seen = Vec::new();
    map.for_each(|&v| seen.push(v));
    seen.sort_unstable();
    assert_eq!(seen, inserted);
}
