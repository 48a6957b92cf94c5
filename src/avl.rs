//! Arena-backed order-statistic AVL tree.
//!
//! Nodes live in a slab and refer to each other through `u32` index handles,
//! so rotations rewrite indices instead of aliased pointers. Every node
//! carries its height and its subtree node count; the count makes
//! [`AvlTree::offset`] an O(log N) rank walk instead of a linear scan.
//!
//! Handles stay valid until the node is removed, which lets a side index
//! (such as the sorted-set member table) hold them long-term.

/// Index handle into the tree's node slab.
pub type NodeId = u32;

/// Sentinel for "no node".
pub const NIL: NodeId = u32::MAX;

struct Slot<T> {
    value: Option<T>,
    left: NodeId,
    right: NodeId,
    parent: NodeId,
    height: u32,
    count: u32,
}

/// Height-balanced search tree over `T`, ordered by `T: Ord`.
///
/// Duplicate values are not rejected; equal values land in the right
/// subtree. Callers that need uniqueness enforce it with a side index.
pub struct AvlTree<T> {
    slots: Vec<Slot<T>>,
    root: NodeId,
    free: Vec<NodeId>,
}

impl<T: Ord> Default for AvlTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> AvlTree<T> {
    pub fn new() -> Self {
        AvlTree {
            slots: Vec::new(),
            root: NIL,
            free: Vec::new(),
        }
    }

    /// Number of values in the tree.
    pub fn len(&self) -> usize {
        self.count(self.root) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.root == NIL
    }

    /// The value behind a live handle.
    pub fn get(&self, id: NodeId) -> &T {
        self.val(id)
    }

    /// Insert `value`, rebalance, and return its handle.
    pub fn insert(&mut self, value: T) -> NodeId {
        let id = self.alloc(value);
        if self.root == NIL {
            self.root = id;
            return id;
        }
        let mut cur = self.root;
        loop {
            let next = if self.val(id) < self.val(cur) {
                self.slot(cur).left
            } else {
                self.slot(cur).right
            };
            if next == NIL {
                if self.val(id) < self.val(cur) {
                    self.slot_mut(cur).left = id;
                } else {
                    self.slot_mut(cur).right = id;
                }
                self.slot_mut(id).parent = cur;
                break;
            }
            cur = next;
        }
        self.root = self.fix(id);
        id
    }

    /// Detach the node behind `id`, rebalance, and return its value.
    /// The handle is recycled and must not be used again.
    pub fn remove(&mut self, id: NodeId) -> T {
        let new_root = self.detach(id);
        self.root = new_root;
        let value = self.slots[id as usize]
            .value
            .take()
            .expect("remove of a freed avl handle");
        self.free.push(id);
        value
    }

    /// Smallest value that is not less than `probe`, as a handle.
    pub fn lower_bound(&self, probe: &T) -> Option<NodeId> {
        let mut cur = self.root;
        let mut found = NIL;
        while cur != NIL {
            if self.val(cur) < probe {
                cur = self.slot(cur).right;
            } else {
                found = cur;
                cur = self.slot(cur).left;
            }
        }
        (found != NIL).then_some(found)
    }

    /// Walk `delta` positions through the in-order sequence starting at `id`.
    /// Subtree counts let the walk skip whole subtrees, so the cost is
    /// O(log N) regardless of the distance.
    pub fn offset(&self, id: NodeId, delta: i64) -> Option<NodeId> {
        let mut node = id;
        let mut pos = 0i64;
        while pos != delta {
            let right = self.slot(node).right;
            let left = self.slot(node).left;
            if pos < delta && pos + self.count(right) as i64 >= delta {
                // Target is inside the right subtree.
                node = right;
                pos += self.count(self.slot(node).left) as i64 + 1;
            } else if pos > delta && pos - (self.count(left) as i64) <= delta {
                // Target is inside the left subtree.
                node = left;
                pos -= self.count(self.slot(node).right) as i64 + 1;
            } else {
                let parent = self.slot(node).parent;
                if parent == NIL {
                    return None;
                }
                if self.slot(parent).right == node {
                    pos -= self.count(left) as i64 + 1;
                } else {
                    pos += self.count(right) as i64 + 1;
                }
                node = parent;
            }
        }
        Some(node)
    }

    // ── Internal plumbing ────────────────────────────────────────────────────

    fn alloc(&mut self, value: T) -> NodeId {
        let fresh = Slot {
            value: Some(value),
            left: NIL,
            right: NIL,
            parent: NIL,
            height: 1,
            count: 1,
        };
        match self.free.pop() {
            Some(id) => {
                self.slots[id as usize] = fresh;
                id
            }
            None => {
                self.slots.push(fresh);
                (self.slots.len() - 1) as NodeId
            }
        }
    }

    fn slot(&self, id: NodeId) -> &Slot<T> {
        &self.slots[id as usize]
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot<T> {
        &mut self.slots[id as usize]
    }

    fn val(&self, id: NodeId) -> &T {
        self.slots[id as usize]
            .value
            .as_ref()
            .expect("freed avl handle")
    }

    fn height(&self, id: NodeId) -> u32 {
        if id == NIL {
            0
        } else {
            self.slot(id).height
        }
    }

    fn count(&self, id: NodeId) -> u32 {
        if id == NIL {
            0
        } else {
            self.slot(id).count
        }
    }

    fn update(&mut self, id: NodeId) {
        let (left, right) = {
            let s = self.slot(id);
            (s.left, s.right)
        };
        let height = 1 + self.height(left).max(self.height(right));
        let count = 1 + self.count(left) + self.count(right);
        let s = self.slot_mut(id);
        s.height = height;
        s.count = count;
    }

    fn rot_left(&mut self, node: NodeId) -> NodeId {
        let pivot = self.slot(node).right;
        let moved = self.slot(pivot).left;
        if moved != NIL {
            self.slot_mut(moved).parent = node;
        }
        self.slot_mut(node).right = moved;
        self.slot_mut(pivot).left = node;
        self.slot_mut(pivot).parent = self.slot(node).parent;
        self.slot_mut(node).parent = pivot;
        self.update(node);
        self.update(pivot);
        pivot
    }

    fn rot_right(&mut self, node: NodeId) -> NodeId {
        let pivot = self.slot(node).left;
        let moved = self.slot(pivot).right;
        if moved != NIL {
            self.slot_mut(moved).parent = node;
        }
        self.slot_mut(node).left = moved;
        self.slot_mut(pivot).right = node;
        self.slot_mut(pivot).parent = self.slot(node).parent;
        self.slot_mut(node).parent = pivot;
        self.update(node);
        self.update(pivot);
        pivot
    }

    fn fix_left(&mut self, root: NodeId) -> NodeId {
        let left = self.slot(root).left;
        if self.height(self.slot(left).left) < self.height(self.slot(left).right) {
            let rotated = self.rot_left(left);
            self.slot_mut(root).left = rotated;
        }
        self.rot_right(root)
    }

    fn fix_right(&mut self, root: NodeId) -> NodeId {
        let right = self.slot(root).right;
        if self.height(self.slot(right).right) < self.height(self.slot(right).left) {
            let rotated = self.rot_right(right);
            self.slot_mut(root).right = rotated;
        }
        self.rot_left(root)
    }

    /// Restore height/count and balance from `id` up to the root; returns the
    /// new root of the whole tree.
    fn fix(&mut self, start: NodeId) -> NodeId {
        let mut node = start;
        loop {
            self.update(node);
            let l = self.height(self.slot(node).left);
            let r = self.height(self.slot(node).right);
            let parent = self.slot(node).parent;
            let from_left = parent != NIL && self.slot(parent).left == node;
            if l == r + 2 {
                node = self.fix_left(node);
            } else if l + 2 == r {
                node = self.fix_right(node);
            }
            if parent == NIL {
                return node;
            }
            if from_left {
                self.slot_mut(parent).left = node;
            } else {
                self.slot_mut(parent).right = node;
            }
            node = parent;
        }
    }

    /// Unlink `id` from the tree structure and return the new root. The slot
    /// itself is not freed; `remove` does that.
    fn detach(&mut self, id: NodeId) -> NodeId {
        if self.slot(id).right == NIL {
            // No right subtree: splice the left child into the parent.
            let parent = self.slot(id).parent;
            let left = self.slot(id).left;
            if left != NIL {
                self.slot_mut(left).parent = parent;
            }
            if parent == NIL {
                return left;
            }
            if self.slot(parent).left == id {
                self.slot_mut(parent).left = left;
            } else {
                self.slot_mut(parent).right = left;
            }
            return self.fix(parent);
        }

        // Two-sided: detach the in-order successor, then let it take over
        // this node's links. Links are re-read after the recursive detach
        // because rebalancing may have rewritten them.
        let mut victim = self.slot(id).right;
        while self.slot(victim).left != NIL {
            victim = self.slot(victim).left;
        }
        let root = self.detach(victim);

        let (left, right, parent, height, count) = {
            let s = self.slot(id);
            (s.left, s.right, s.parent, s.height, s.count)
        };
        {
            let v = self.slot_mut(victim);
            v.left = left;
            v.right = right;
            v.parent = parent;
            v.height = height;
            v.count = count;
        }
        if left != NIL {
            self.slot_mut(left).parent = victim;
        }
        if right != NIL {
            self.slot_mut(right).parent = victim;
        }
        if parent == NIL {
            return victim;
        }
        if self.slot(parent).left == id {
            self.slot_mut(parent).left = victim;
        } else {
            self.slot_mut(parent).right = victim;
        }
        root
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn in_order(tree: &AvlTree<i32>) -> Vec<i32> {
        let mut out = Vec::new();
        let Some(mut cur) = tree.lower_bound(&i32::MIN) else {
            return out;
        };
        loop {
            out.push(*tree.get(cur));
            match tree.offset(cur, 1) {
                Some(next) => cur = next,
                None => break,
            }
        }
        out
    }

    #[test]
    fn stays_sorted_under_mixed_inserts() {
        let mut tree = AvlTree::new();
        for v in [5, 1, 9, 3, 7, 2, 8, 0, 6, 4] {
            tree.insert(v);
        }
        assert_eq!(in_order(&tree), (0..10).collect::<Vec<_>>());
        assert_eq!(tree.len(), 10);
    }

    #[test]
    fn remove_keeps_order_and_counts() {
        let mut tree = AvlTree::new();
        let ids: Vec<NodeId> = (0..50).map(|v| tree.insert(v)).collect();
        for (v, id) in ids.iter().enumerate().filter(|(v, _)| v % 3 == 0) {
            assert_eq!(tree.remove(*id), v as i32);
        }
        let expect: Vec<i32> = (0..50).filter(|v| v % 3 != 0).collect();
        assert_eq!(in_order(&tree), expect);
        assert_eq!(tree.len(), expect.len());
    }

    #[test]
    fn lower_bound_finds_first_not_less() {
        let mut tree = AvlTree::new();
        for v in [10, 20, 30] {
            tree.insert(v);
        }
        assert_eq!(tree.lower_bound(&15).map(|id| *tree.get(id)), Some(20));
        assert_eq!(tree.lower_bound(&20).map(|id| *tree.get(id)), Some(20));
        assert_eq!(tree.lower_bound(&31), None);
    }

    #[test]
    fn offset_walks_both_directions() {
        let mut tree = AvlTree::new();
        for v in 0..100 {
            tree.insert(v);
        }
        let start = tree.lower_bound(&40).unwrap();
        assert_eq!(tree.offset(start, 25).map(|id| *tree.get(id)), Some(65));
        assert_eq!(tree.offset(start, -40).map(|id| *tree.get(id)), Some(0));
        assert_eq!(tree.offset(start, 60), None);
        assert_eq!(tree.offset(start, -41), None);
    }
}
