//! Query memoization.
//!
//! A small LRU keyed on the full query signature short-circuits the whole
//! vectorize → search → aggregate pipeline for repeated queries. Recency is
//! tracked with a monotonic access counter; eviction removes the entry with
//! the oldest access stamp.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::query::QueryPayload;

/// Full signature of a memoizable query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    text: String,
    k: usize,
    /// f32 bit pattern, so the key stays `Eq + Hash`.
    radius_bits: u32,
    start: String,
    end: String,
    rerank_by_doc: bool,
}

impl QueryKey {
    pub fn new(
        text: &str,
        k: usize,
        radius: f32,
        start: &str,
        end: &str,
        rerank_by_doc: bool,
    ) -> Self {
        Self {
            text: text.to_string(),
            k,
            radius_bits: radius.to_bits(),
            start: start.to_string(),
            end: end.to_string(),
            rerank_by_doc,
        }
    }
}

struct CacheEntry {
    payload: Arc<QueryPayload>,
    last_accessed: AtomicU64,
}

pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, CacheEntry>>,
    capacity: usize,
    access_counter: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            access_counter: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<Arc<QueryPayload>> {
        let entries = self.entries.read();
        if let Some(entry) = entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            let access = self.access_counter.fetch_add(1, Ordering::Relaxed);
            entry.last_accessed.store(access, Ordering::Relaxed);
            Some(Arc::clone(&entry.payload))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn put(&self, key: QueryKey, payload: Arc<QueryPayload>) {
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return;
        }
        while entries.len() >= self.capacity {
            let lru_key = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone());
            match lru_key {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
        let access = self.access_counter.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key,
            CacheEntry {
                payload,
                last_accessed: AtomicU64::new(access),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
