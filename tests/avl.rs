// Unit tests for the order-statistic tree (avl.rs).
//
// Coverage:
//   - offset() reaches exactly the value k positions away, in both
//     directions, and returns None out of range
//   - the laws hold after heavy insert/remove churn
//   - lower_bound() is an inclusive lower bound over the whole value range

use minkv::avl::{AvlTree, NodeId};

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

fn node_of(tree: &AvlTree<i64>, value: i64) -> NodeId {
    tree.lower_bound(&value).expect("value present")
}

// ─────────────────────────────────────────────────────────────────────────────
// Offset laws
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn offset_reaches_every_rank_from_every_start() {
    let mut tree = AvlTree::new();
    let n: i64 = 64;
    // Shuffled insert order.
    let mut values: Vec<i64> = (0..n).collect();
    let mut rng = XorShift(7);
    for i in (1..values.len()).rev() {
        values.swap(i, (rng.next() % (i as u64 + 1)) as usize);
    }
    for v in values {
        tree.insert(v);
    }

    for start in 0..n {
        let node = node_of(&tree, start);
        for delta in -n..=n {
            let target = start + delta;
            let reached = tree.offset(node, delta).map(|id| *tree.get(id));
            if (0..n).contains(&target) {
                assert_eq!(reached, Some(target), "offset({start}, {delta})");
            } else {
                assert_eq!(reached, None, "offset({start}, {delta}) must be out of range");
            }
        }
    }
}

#[test]
fn offset_laws_survive_churn() {
    let mut tree = AvlTree::new();
    let mut rng = XorShift(42);
    let mut live: Vec<i64> = Vec::new();

    for round in 0..2_000i64 {
        if live.is_empty() || rng.next() % 3 != 0 {
            let v = round * 7 % 1_009;
            if !live.contains(&v) {
                tree.insert(v);
                live.push(v);
            }
        } else {
            let victim = live.swap_remove((rng.next() % live.len() as u64) as usize);
            let id = node_of(&tree, victim);
            assert_eq!(tree.remove(id), victim);
        }
    }

    live.sort_unstable();
    assert_eq!(tree.len(), live.len());

    // Walking rank by rank from the smallest value visits the sorted list.
    let first = node_of(&tree, live[0]);
    for (rank, expected) in live.iter().enumerate() {
        let reached = tree.offset(first, rank as i64).map(|id| *tree.get(id));
        assert_eq!(reached, Some(*expected), "rank {rank}");
    }
    assert_eq!(tree.offset(first, live.len() as i64), None);
}

// ─────────────────────────────────────────────────────────────────────────────
// Lower bound
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn lower_bound_over_gaps() {
    let mut tree = AvlTree::new();
    for v in (0..100i64).map(|v| v * 10) {
        tree.insert(v);
    }
    for probe in 0..1_000i64 {
        let rounded_up = (probe + 9) / 10 * 10;
        let expect = (rounded_up < 1_000).then_some(rounded_up);
        let got = tree.lower_bound(&probe).map(|id| *tree.get(id));
        assert_eq!(got, expect, "probe {probe}");
    }
    assert_eq!(tree.lower_bound(&991), None);
}
