// Unit tests for the sorted set (zset.rs).
//
// Coverage:
//   - dual-index duality: after arbitrary add/pop churn, the name index
//     and the in-order tree walk agree exactly
//   - score updates move members to their new rank
//   - query + offset paging behaves like a slice of the sorted list

use minkv::zset::ZSet;

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

fn member(n: u64) -> Vec<u8> {
    format!("m{n:04}").into_bytes()
}

fn walk(zs: &ZSet) -> Vec<(f64, Vec<u8>)> {
    let mut out = Vec::new();
    let Some(mut cur) = zs.query(f64::NEG_INFINITY, b"") else {
        return out;
    };
    loop {
        let item = zs.item(cur);
        out.push((item.score, item.name.to_vec()));
        match zs.offset(cur, 1) {
            Some(next) => cur = next,
            None => break,
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Duality
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn name_index_and_tree_walk_agree_under_churn() {
    let mut rng = XorShift(0xdead_beef);
    let mut zs = ZSet::new();
    let mut reference: Vec<(Vec<u8>, f64)> = Vec::new();

    for _ in 0..4_000 {
        let name = member(rng.next() % 300);
        match rng.next() % 3 {
            0 | 1 => {
                let score = (rng.next() % 1_000) as f64 / 8.0 - 50.0;
                let inserted = zs.add(&name, score);
                let known = reference.iter_mut().find(|(n, _)| *n == name);
                match known {
                    Some((_, held)) => {
                        assert!(!inserted);
                        *held = score;
                    }
                    None => {
                        assert!(inserted);
                        reference.push((name, score));
                    }
                }
            }
            _ => {
                let popped = zs.pop(&name).is_some();
                let pos = reference.iter().position(|(n, _)| *n == name);
                assert_eq!(popped, pos.is_some());
                if let Some(pos) = pos {
                    reference.swap_remove(pos);
                }
            }
        }
    }

    assert_eq!(zs.len(), reference.len());

    // Point lookups agree with the reference.
    for (name, score) in &reference {
        assert_eq!(zs.score(name), Some(*score));
    }
    for n in 0..300 {
        let name = member(n);
        let known = reference.iter().any(|(held, _)| *held == name);
        assert_eq!(zs.find(&name).is_some(), known);
    }

    // The in-order walk is exactly the reference, sorted by (score, name).
    let mut expect: Vec<(f64, Vec<u8>)> = reference
        .into_iter()
        .map(|(name, score)| (score, name))
        .collect();
    expect.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    assert_eq!(walk(&zs), expect);
}

// ─────────────────────────────────────────────────────────────────────────────
// Rank paging
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn query_offset_pages_like_a_slice() {
    let mut zs = ZSet::new();
    for n in 0..50u64 {
        zs.add(&member(n), n as f64);
    }
    // Page of 10 starting 5 past the first tuple >= (20.0, "").
    let start = zs
        .query(20.0, b"")
        .and_then(|id| zs.offset(id, 5))
        .expect("in range");
    let mut page = Vec::new();
    let mut cur = Some(start);
    while let Some(id) = cur {
        if page.len() == 10 {
            break;
        }
        page.push(zs.item(id).score as u64);
        cur = zs.offset(id, 1);
    }
    assert_eq!(page, (25..35).collect::<Vec<_>>());
}

#[test]
fn score_ties_order_by_name() {
    let mut zs = ZSet::new();
    zs.add(b"delta", 1.0);
    zs.add(b"alpha", 1.0);
    zs.add(b"charlie", 1.0);
    let names: Vec<Vec<u8>> = walk(&zs).into_iter().map(|(_, n)| n).collect();
    assert_eq!(
        names,
        vec![b"alpha".to_vec(), b"charlie".to_vec(), b"delta".to_vec()]
    );
}
