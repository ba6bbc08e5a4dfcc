//! In-memory sorted write buffer.
//!
//! The memtable holds every write since the last flush in a concurrent skip
//! list (`crossbeam-skiplist::SkipMap`), ordered by byte-lexicographic key.
//! Readers traverse it lock-free while a writer inserts; the engine
//! serialises writers itself, so the size counter can be maintained with a
//! plain get-then-insert.
//!
//! `size` approximates resident bytes: an insert adds `key.len() +
//! value.len()`, an overwrite adjusts by the difference between the new and
//! old value lengths. Once `size` reaches the configured limit the engine
//! flushes the memtable into a new sstable and clears it.

use crossbeam_skiplist::SkipMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct Memtable {
    data: SkipMap<String, String>,
    size: AtomicUsize,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            data: SkipMap::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// Insert or overwrite a key. Callers must serialise writes; concurrent
    /// readers are safe at any time.
    pub fn put(&self, key: String, value: String) {
        match self.data.get(&key) {
            Some(old) => {
                let old_len = old.value().len();
                if value.len() >= old_len {
                    self.size.fetch_add(value.len() - old_len, Ordering::SeqCst);
                } else {
                    self.size.fetch_sub(old_len - value.len(), Ordering::SeqCst);
                }
            }
            None => {
                self.size
                    .fetch_add(key.len() + value.len(), Ordering::SeqCst);
            }
        }
        self.data.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    /// Iterate every entry in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
    }

    /// Approximate resident bytes.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True once the resident size has reached the flush threshold.
    pub fn should_flush(&self, limit: usize) -> bool {
        self.size() >= limit
    }

    /// Empty the container and reset the size counter.
    pub fn clear(&self) {
        while self.data.pop_front().is_some() {}
        self.size.store(0, Ordering::SeqCst);
    }
}
