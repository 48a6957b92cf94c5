//! The keyspace: entries, their TTLs, and their destruction.
//!
//! An [`Entry`] is owned exclusively by the hash map and leaves it only by
//! being popped; it is dropped only after it is out of every index. An entry
//! with a TTL shares a back-pointer slot with exactly one heap item, so the
//! map, the heap, and the entry stay mutually consistent:
//!
//! * `entry.heap_slot == None` means no TTL;
//! * otherwise the heap item at `slot.load()` holds the same slot and the
//!   entry's key. The expiry pass asserts this identity before destroying
//!   anything; a mismatch is a corrupted index and aborts the process.
//!
//! Entries whose sorted set is large are not dropped on the event loop:
//! ownership moves into a worker-pool task instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::{DESTROYER_THREADS, LARGE_ZSET_LEN, TTL_EXPIRE_BATCH};
use crate::hash::{fnv1a, HMap};
use crate::heap::{HeapItem, TtlHeap};
use crate::threadpool::{Task, ThreadPool};
use crate::zset::ZSet;

/// What an entry holds.
pub enum Value {
    Str(Vec<u8>),
    ZSet(Box<ZSet>),
}

/// One stored key with its value and optional TTL back-pointer.
pub struct Entry {
    pub key: Arc<[u8]>,
    pub hash: u64,
    pub value: Value,
    pub heap_slot: Option<Arc<AtomicUsize>>,
}

impl Entry {
    pub fn new_str(key: &[u8], value: &[u8]) -> Self {
        Entry {
            key: Arc::from(key),
            hash: fnv1a(key),
            value: Value::Str(value.to_vec()),
            heap_slot: None,
        }
    }

    pub fn new_zset(key: &[u8], zset: Box<ZSet>) -> Self {
        Entry {
            key: Arc::from(key),
            hash: fnv1a(key),
            value: Value::ZSet(zset),
            heap_slot: None,
        }
    }
}

/// The shared store: hash map of entries, TTL heap, and the destruction pool.
pub struct Keyspace {
    map: HMap<Entry>,
    heap: TtlHeap,
    pool: ThreadPool,
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    pub fn new() -> Self {
        Keyspace {
            map: HMap::new(),
            heap: TtlHeap::new(),
            pool: ThreadPool::new(DESTROYER_THREADS),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&mut self, key: &[u8]) -> Option<&Entry> {
        let hash = fnv1a(key);
        self.map.lookup(hash, |e| &*e.key == key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let hash = fnv1a(key);
        self.map.lookup_mut(hash, |e| &*e.key == key)
    }

    pub fn contains(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Insert a fresh entry. The key must not be present; callers look it up
    /// first.
    pub fn insert(&mut self, entry: Entry) {
        self.map.insert(entry.hash, entry);
    }

    /// Pop the entry for `key` out of every index and hand it to
    /// destruction. Returns whether the key existed.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        let hash = fnv1a(key);
        match self.map.pop(hash, |e| &*e.key == key) {
            Some(entry) => {
                self.dispose(entry);
                true
            }
            None => false,
        }
    }

    /// Visit every key in the store.
    pub fn for_each_key(&self, mut f: impl FnMut(&[u8])) {
        self.map.for_each(|entry| f(&entry.key));
    }

    // ── TTL wiring ───────────────────────────────────────────────────────────

    /// Set or clear the TTL of `key`. Negative `ttl_ms` clears. Returns
    /// whether the key existed.
    pub fn set_ttl(&mut self, key: &[u8], ttl_ms: i64, now_us: u64) -> bool {
        let hash = fnv1a(key);
        let Some(entry) = self.map.lookup_mut(hash, |e| &*e.key == key) else {
            return false;
        };
        if ttl_ms < 0 {
            if let Some(slot) = entry.heap_slot.take() {
                let item = self.heap.remove(slot.load(Ordering::Relaxed));
                assert!(
                    Arc::ptr_eq(&item.slot, &slot),
                    "ttl heap back-pointer mismatch"
                );
            }
        } else {
            let deadline_us = now_us + ttl_ms as u64 * 1000;
            match &entry.heap_slot {
                Some(slot) => self.heap.set_deadline(slot.load(Ordering::Relaxed), deadline_us),
                None => {
                    let slot = Arc::new(AtomicUsize::new(0));
                    entry.heap_slot = Some(Arc::clone(&slot));
                    self.heap.push(HeapItem {
                        deadline_us,
                        key: Arc::clone(&entry.key),
                        hash: entry.hash,
                        slot,
                    });
                }
            }
        }
        true
    }

    /// Remaining TTL of `key` in milliseconds: -2 when the key is missing,
    /// -1 when it has no TTL, 0 when already due.
    pub fn ttl_remaining_ms(&mut self, key: &[u8], now_us: u64) -> i64 {
        let hash = fnv1a(key);
        let Some(entry) = self.map.lookup(hash, |e| &*e.key == key) else {
            return -2;
        };
        let Some(slot) = &entry.heap_slot else {
            return -1;
        };
        let deadline_us = self.heap.item(slot.load(Ordering::Relaxed)).deadline_us;
        if deadline_us > now_us {
            ((deadline_us - now_us) / 1000) as i64
        } else {
            0
        }
    }

    /// Deadline of the next pending expiry.
    pub fn next_deadline_us(&self) -> Option<u64> {
        self.heap.next_deadline()
    }

    /// Collect entries whose deadline has passed, at most
    /// [`TTL_EXPIRE_BATCH`] per call. Returns how many were destroyed.
    pub fn expire_pass(&mut self, now_us: u64) -> usize {
        let mut works = 0;
        while works < TTL_EXPIRE_BATCH {
            match self.heap.next_deadline() {
                Some(deadline_us) if deadline_us <= now_us => {}
                _ => break,
            }
            let item = self.heap.remove(0);
            let entry = self.map.pop(item.hash, |e| e.key == item.key);
            let mut entry = entry.expect("expired key missing from the map");
            let slot = entry.heap_slot.take();
            assert!(
                slot.is_some_and(|s| Arc::ptr_eq(&s, &item.slot)),
                "ttl heap back-pointer mismatch"
            );
            self.dispose(entry);
            works += 1;
        }
        works
    }

    // ── Destruction ──────────────────────────────────────────────────────────

    /// Destroy an entry that is already out of the map. Clears any TTL it
    /// still holds, then drops it inline or on the pool depending on size.
    pub fn dispose(&mut self, mut entry: Entry) {
        if let Some(slot) = entry.heap_slot.take() {
            let item = self.heap.remove(slot.load(Ordering::Relaxed));
            assert!(
                Arc::ptr_eq(&item.slot, &slot),
                "ttl heap back-pointer mismatch"
            );
        }
        let large = matches!(&entry.value, Value::ZSet(z) if z.len() > LARGE_ZSET_LEN);
        if large {
            self.pool.submit(Task::DestroyEntry(entry));
        } else {
            drop(entry);
        }
    }

    /// Close the worker pool, draining queued destruction first.
    pub fn shutdown(&mut self) {
        self.pool.shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
