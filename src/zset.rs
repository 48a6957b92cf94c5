//! Sorted set: `(score, member)` tuples with unique members.
//!
//! Dual-indexed. An order-statistic AVL tree keyed by
//! `(score ascending, name ascending bytewise)` answers range and rank
//! queries; a hash table keyed by member name answers point lookups in O(1)
//! average. Every member is present in both indices.

use std::cmp::Ordering;

use crate::avl::{AvlTree, NodeId};
use crate::hash::{fnv1a, HMap};

/// One member: its score and its name. Ordered by score, then by name bytes
/// on score ties.
pub struct ZItem {
    pub score: f64,
    pub name: Box<[u8]>,
}

impl PartialEq for ZItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ZItem {}

impl PartialOrd for ZItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ZItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Scores are never NaN here; the command layer rejects NaN input.
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// The sorted set.
pub struct ZSet {
    tree: AvlTree<ZItem>,
    index: HMap<NodeId>,
}

impl Default for ZSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ZSet {
    pub fn new() -> Self {
        ZSet {
            tree: AvlTree::new(),
            index: HMap::new(),
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Insert `name` with `score`, or update the score of an existing member.
    /// Returns true when a new member was inserted, false on update.
    ///
    /// A score update detaches the node from the tree and reinserts it at its
    /// new rank; an update to the same score is a no-op.
    pub fn add(&mut self, name: &[u8], score: f64) -> bool {
        let hash = fnv1a(name);
        let tree = &self.tree;
        let found = self
            .index
            .lookup(hash, |&id| *tree.get(id).name == *name)
            .copied();
        match found {
            Some(id) => {
                if self.tree.get(id).score != score {
                    let mut item = self.tree.remove(id);
                    item.score = score;
                    let moved = self.tree.insert(item);
                    if let Some(slot) = self.index.lookup_mut(hash, |&held| held == id) {
                        *slot = moved;
                    }
                }
                false
            }
            None => {
                let id = self.tree.insert(ZItem {
                    score,
                    name: name.into(),
                });
                self.index.insert(hash, id);
                true
            }
        }
    }

    /// Handle of the member called `name`, if present.
    pub fn find(&mut self, name: &[u8]) -> Option<NodeId> {
        let hash = fnv1a(name);
        let tree = &self.tree;
        self.index
            .lookup(hash, |&id| *tree.get(id).name == *name)
            .copied()
    }

    /// Score of the member called `name`, if present.
    pub fn score(&mut self, name: &[u8]) -> Option<f64> {
        let id = self.find(name)?;
        Some(self.tree.get(id).score)
    }

    /// Remove `name` from both indices and return the detached item.
    pub fn pop(&mut self, name: &[u8]) -> Option<ZItem> {
        let hash = fnv1a(name);
        let tree = &self.tree;
        let id = self.index.pop(hash, |&id| *tree.get(id).name == *name)?;
        Some(self.tree.remove(id))
    }

    /// Smallest tuple `(s, n)` with `(s, n) >= (score, name)`.
    pub fn query(&self, score: f64, name: &[u8]) -> Option<NodeId> {
        let probe = ZItem {
            score,
            name: name.into(),
        };
        self.tree.lower_bound(&probe)
    }

    /// Walk `delta` ranks from `id` through the score order.
    pub fn offset(&self, id: NodeId, delta: i64) -> Option<NodeId> {
        self.tree.offset(id, delta)
    }

    /// The item behind a live handle.
    pub fn item(&self, id: NodeId) -> &ZItem {
        self.tree.get(id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn orders_by_score_then_name() {
        let mut zs = ZSet::new();
        assert!(zs.add(b"beta", 2.0));
        assert!(zs.add(b"alpha", 2.0));
        assert!(zs.add(b"gamma", 1.0));
        let order: Vec<Vec<u8>> = walk(&zs).into_iter().map(|(_, n)| n).collect();
        assert_eq!(order, vec![b"gamma".to_vec(), b"alpha".to_vec(), b"beta".to_vec()]);
    }

    #[test]
    fn add_existing_updates_rank() {
        let mut zs = ZSet::new();
        zs.add(b"a", 1.0);
        zs.add(b"b", 2.0);
        assert!(!zs.add(b"a", 3.0));
        assert_eq!(zs.score(b"a"), Some(3.0));
        let order: Vec<Vec<u8>> = walk(&zs).into_iter().map(|(_, n)| n).collect();
        assert_eq!(order, vec![b"b".to_vec(), b"a".to_vec()]);
        assert_eq!(zs.len(), 2);
    }

    #[test]
    fn pop_removes_from_both_indices() {
        let mut zs = ZSet::new();
        zs.add(b"x", 1.0);
        zs.add(b"y", 2.0);
        let item = zs.pop(b"x").expect("member exists");
        assert_eq!(&*item.name, b"x");
        assert!(zs.find(b"x").is_none());
        assert_eq!(walk(&zs).len(), 1);
        assert!(zs.pop(b"x").is_none());
    }

    #[test]
    fn query_is_inclusive_lower_bound() {
        let mut zs = ZSet::new();
        zs.add(b"a", 1.0);
        zs.add(b"b", 2.0);
        zs.add(b"c", 3.0);
        let at = zs.query(2.0, b"").map(|id| zs.item(id).name.to_vec());
        assert_eq!(at, Some(b"b".to_vec()));
        let past = zs.query(3.0, b"d");
        assert!(past.is_none());
    }
}
