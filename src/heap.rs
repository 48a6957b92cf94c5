//! Min-heap of TTL deadlines.
//!
//! Each item carries the key it expires, that key's cached hash, and a
//! shared back-pointer slot. The owning entry holds a clone of the same
//! slot; after every heap motion the slot is rewritten to the item's new
//! index, so the entry can reach its heap position in O(1) and the expiry
//! pass can verify it popped the right entry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One pending expiry. `deadline_us` is monotonic microseconds from the
/// server's start.
pub struct HeapItem {
    pub deadline_us: u64,
    pub key: Arc<[u8]>,
    pub hash: u64,
    pub slot: Arc<AtomicUsize>,
}

/// Array-backed min-heap ordered by deadline.
#[derive(Default)]
pub struct TtlHeap {
    items: Vec<HeapItem>,
}

impl TtlHeap {
    pub fn new() -> Self {
        TtlHeap { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Deadline of the earliest expiry, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.items.first().map(|item| item.deadline_us)
    }

    /// The item at heap index `pos`.
    pub fn item(&self, pos: usize) -> &HeapItem {
        &self.items[pos]
    }

    /// Add an item and sift it into place. Its slot ends up holding the
    /// final index.
    pub fn push(&mut self, item: HeapItem) {
        let pos = self.items.len();
        item.slot.store(pos, Ordering::Relaxed);
        self.items.push(item);
        self.sift_up(pos);
    }

    /// Remove and return the item at `pos`; the displaced tail item is
    /// sifted to its proper place.
    pub fn remove(&mut self, pos: usize) -> HeapItem {
        let item = self.items.swap_remove(pos);
        if pos < self.items.len() {
            self.update(pos);
        }
        item
    }

    /// Rewrite the deadline at `pos` and restore heap order.
    pub fn set_deadline(&mut self, pos: usize, deadline_us: u64) {
        self.items[pos].deadline_us = deadline_us;
        self.update(pos);
    }

    /// Sift the item at `pos` up or down, whichever the parent comparison
    /// calls for.
    pub fn update(&mut self, pos: usize) {
        if pos > 0 && self.items[parent(pos)].deadline_us > self.items[pos].deadline_us {
            self.sift_up(pos);
        } else {
            self.sift_down(pos);
        }
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let up = parent(pos);
            if self.items[up].deadline_us <= self.items[pos].deadline_us {
                break;
            }
            self.items.swap(pos, up);
            self.items[pos].slot.store(pos, Ordering::Relaxed);
            pos = up;
        }
        self.items[pos].slot.store(pos, Ordering::Relaxed);
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.items.len();
        loop {
            let l = 2 * pos + 1;
            let r = 2 * pos + 2;
            let mut least = pos;
            if l < len && self.items[l].deadline_us < self.items[least].deadline_us {
                least = l;
            }
            if r < len && self.items[r].deadline_us < self.items[least].deadline_us {
                least = r;
            }
            if least == pos {
                break;
            }
            self.items.swap(pos, least);
            self.items[pos].slot.store(pos, Ordering::Relaxed);
            pos = least;
        }
        self.items[pos].slot.store(pos, Ordering::Relaxed);
    }
}

fn parent(pos: usize) -> usize {
    (pos - 1) / 2
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
