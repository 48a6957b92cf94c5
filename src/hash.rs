//! Progressive two-table hash map.
//!
//! Chained buckets addressed by `hash & mask`, where the bucket-array
//! capacity is always a power of two. When the load factor reaches
//! [`MAX_LOAD_FACTOR`](crate::config::MAX_LOAD_FACTOR), the map allocates a
//! table of double capacity and migrates entries incrementally: every
//! subsequent operation relocates at most
//! [`REHASH_WORK`](crate::config::REHASH_WORK) entries from the retiring
//! table, so no single call ever stalls on a full rehash.
//!
//! The map is not intrusive: it owns its items and decides equality through
//! a caller-supplied predicate, with the 64-bit hash cached per node as a
//! cheap pre-filter.

use std::hash::Hasher;

use fnv::FnvHasher;

use crate::config::{INITIAL_CAPACITY, MAX_LOAD_FACTOR, REHASH_WORK};

/// FNV-1a over `data`, 64-bit. The keyed hash used across the keyspace and
/// the sorted-set member index.
pub fn fnv1a(data: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(data);
    hasher.finish()
}

// ─────────────────────────────────────────────────────────────────────────────
// Bucket chains
// ─────────────────────────────────────────────────────────────────────────────

struct Node<T> {
    hash: u64,
    item: T,
    next: Option<Box<Node<T>>>,
}

struct Table<T> {
    slots: Vec<Option<Box<Node<T>>>>,
    mask: usize,
    len: usize,
}

impl<T> Table<T> {
    fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Table {
            slots,
            mask: capacity - 1,
            len: 0,
        }
    }

    fn insert_node(&mut self, mut node: Box<Node<T>>) {
        let pos = (node.hash as usize) & self.mask;
        node.next = self.slots[pos].take();
        self.slots[pos] = Some(node);
        self.len += 1;
    }

    fn lookup(&self, hash: u64, eq: &impl Fn(&T) -> bool) -> Option<&T> {
        let pos = (hash as usize) & self.mask;
        let mut cur = self.slots[pos].as_deref();
        while let Some(node) = cur {
            if node.hash == hash && eq(&node.item) {
                return Some(&node.item);
            }
            cur = node.next.as_deref();
        }
        None
    }

    fn lookup_mut(&mut self, hash: u64, eq: &impl Fn(&T) -> bool) -> Option<&mut T> {
        let pos = (hash as usize) & self.mask;
        let mut cur = &mut self.slots[pos];
        loop {
            match cur {
                None => return None,
                Some(node) => {
                    if node.hash == hash && eq(&node.item) {
                        return Some(&mut node.item);
                    }
                    cur = &mut node.next;
                }
            }
        }
    }

    fn pop(&mut self, hash: u64, eq: &impl Fn(&T) -> bool) -> Option<T> {
        let pos = (hash as usize) & self.mask;
        let chain = self.slots[pos].take();
        let (chain, found) = Self::unlink(chain, hash, eq);
        self.slots[pos] = chain;
        found.map(|node| {
            self.len -= 1;
            node.item
        })
    }

    /// Walk `list` looking for the node matching `hash` + `eq`; rebuild the
    /// chain without it and hand the detached node back.
    #[allow(clippy::type_complexity)]
    fn unlink(
        list: Option<Box<Node<T>>>,
        hash: u64,
        eq: &impl Fn(&T) -> bool,
    ) -> (Option<Box<Node<T>>>, Option<Box<Node<T>>>) {
        match list {
            None => (None, None),
            Some(mut node) => {
                if node.hash == hash && eq(&node.item) {
                    let rest = node.next.take();
                    (rest, Some(node))
                } else {
                    let (rest, found) = Self::unlink(node.next.take(), hash, eq);
                    node.next = rest;
                    (Some(node), found)
                }
            }
        }
    }

    fn for_each(&self, f: &mut impl FnMut(&T)) {
        for slot in &self.slots {
            let mut cur = slot.as_deref();
            while let Some(node) = cur {
                f(&node.item);
                cur = node.next.as_deref();
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// The progressive map
// ─────────────────────────────────────────────────────────────────────────────

/// Hash map with incremental resizing.
///
/// Two tables exist while a resize is in progress: `current` receives all
/// inserts and `retiring` is drained a bounded amount per operation. At most
/// one resize runs at a time, and every lookup or pop consults both tables.
pub struct HMap<T> {
    current: Table<T>,
    retiring: Option<Table<T>>,
    cursor: usize,
}

impl<T> Default for HMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HMap<T> {
    pub fn new() -> Self {
        HMap {
            current: Table::new(INITIAL_CAPACITY),
            retiring: None,
            cursor: 0,
        }
    }

    /// Number of items across both tables.
    pub fn len(&self) -> usize {
        self.current.len + self.retiring.as_ref().map_or(0, |t| t.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items still awaiting relocation into the current table.
    pub fn pending_relocation(&self) -> usize {
        self.retiring.as_ref().map_or(0, |t| t.len)
    }

    pub fn lookup(&mut self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<&T> {
        self.help_resize();
        if let Some(item) = self.current.lookup(hash, &eq) {
            return Some(item);
        }
        self.retiring.as_ref().and_then(|t| t.lookup(hash, &eq))
    }

    pub fn lookup_mut(&mut self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<&mut T> {
        self.help_resize();
        if let Some(item) = self.current.lookup_mut(hash, &eq) {
            return Some(item);
        }
        self.retiring.as_mut().and_then(|t| t.lookup_mut(hash, &eq))
    }

    /// Insert an item under `hash`. The key must not already be present;
    /// callers look it up first.
    pub fn insert(&mut self, hash: u64, item: T) {
        self.current.insert_node(Box::new(Node {
            hash,
            item,
            next: None,
        }));
        if self.retiring.is_none() {
            let load = self.current.len / (self.current.mask + 1);
            if load >= MAX_LOAD_FACTOR {
                self.start_resize();
            }
        }
        self.help_resize();
    }

    pub fn pop(&mut self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<T> {
        self.help_resize();
        if let Some(item) = self.current.pop(hash, &eq) {
            return Some(item);
        }
        self.retiring.as_mut().and_then(|t| t.pop(hash, &eq))
    }

    /// Visit every item in the map, in no particular order.
    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        self.current.for_each(&mut f);
        if let Some(retiring) = &self.retiring {
            retiring.for_each(&mut f);
        }
    }

    fn start_resize(&mut self) {
        debug_assert!(self.retiring.is_none());
        let doubled = Table::new((self.current.mask + 1) * 2);
        self.retiring = Some(std::mem::replace(&mut self.current, doubled));
        self.cursor = 0;
    }

    /// Relocate up to `REHASH_WORK` items from the retiring table, then free
    /// its bucket array once empty.
    fn help_resize(&mut self) {
        let Some(retiring) = self.retiring.as_mut() else {
            return;
        };
        let mut moved = 0;
        while moved < REHASH_WORK && retiring.len > 0 {
            let slot = &mut retiring.slots[self.cursor];
            match slot.take() {
                None => self.cursor += 1,
                Some(mut node) => {
                    *slot = node.next.take();
                    retiring.len -= 1;
                    self.current.insert_node(node);
                    moved += 1;
                }
            }
        }
        if retiring.len == 0 {
            self.retiring = None;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn key_hash(k: u64) -> u64 {
        fnv1a(&k.to_le_bytes())
    }

    #[test]
    fn insert_then_lookup() {
        let mut map: HMap<(u64, u64)> = HMap::new();
        for k in 0..64u64 {
            map.insert(key_hash(k), (k, k * 10));
        }
        assert_eq!(map.len(), 64);
        for k in 0..64u64 {
            let found = map.lookup(key_hash(k), |item| item.0 == k);
            assert_eq!(found, Some(&(k, k * 10)));
        }
        assert!(map.lookup(key_hash(64), |item| item.0 == 64).is_none());
    }

    #[test]
    fn pop_removes_exactly_one() {
        let mut map: HMap<u64> = HMap::new();
        for k in 0..16u64 {
            map.insert(key_hash(k), k);
        }
        assert_eq!(map.pop(key_hash(7), |&item| item == 7), Some(7));
        assert_eq!(map.pop(key_hash(7), |&item| item == 7), None);
        assert_eq!(map.len(), 15);
    }

    #[test]
    fn fnv1a_known_vectors() {
        // Standard FNV-1a 64 results.
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
    }
}
