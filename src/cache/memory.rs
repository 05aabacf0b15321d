//! In-process L1 tier.
//!
//! A bounded map in insertion order: new keys evict the oldest entry at
//! capacity, updating a key moves it to the tail, and reads do not reorder.
//! The lock is only held for O(1) map operations, never across awaits.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use super::CachedEntry;

pub struct MemoryCache {
    inner: Mutex<LruCache<String, CachedEntry>>,
    capacity: usize,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("capacity clamped to >= 1"),
            )),
            capacity,
        }
    }

    /// Look up an entry. Expired entries are dropped on the way out. Reads
    /// deliberately do not refresh the eviction order.
    pub fn get(&self, key: &str) -> Option<CachedEntry> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.peek(key) {
            None => None,
            Some(entry) if entry.is_expired() => {
                inner.pop(key);
                None
            }
            Some(entry) => Some(entry.clone()),
        }
    }

    /// Insert or update; either way the key becomes the newest entry.
    pub fn insert(&self, key: String, entry: CachedEntry) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.push(key, entry);
    }

    pub fn remove(&self, key: &str) {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).pop(key);
    }

    /// Drop every entry whose key contains `fragment`; an empty fragment
    /// clears everything. Returns the number of entries removed.
    pub fn remove_matching(&self, fragment: &str) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if fragment.is_empty() {
            let removed = inner.len();
            inner.clear();
            return removed;
        }
        let matching: Vec<String> = inner
            .iter()
            .filter(|(key, _)| key.contains(fragment))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matching {
            inner.pop(key);
        }
        matching.len()
    }

    pub fn clear(&self) -> usize {
        self.remove_matching("")
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::TextTier;
    use crate::domain::{Operation, TextProcessingResponse};

    fn entry(ttl_s: u64) -> CachedEntry {
        CachedEntry::new(TextProcessingResponse::new(Operation::Summarize), TextTier::Small, ttl_s)
    }

    #[test]
    fn stores_and_returns_entries() {
        let cache = MemoryCache::new(10);
        cache.insert("k1".to_string(), entry(60));
        assert!(cache.get("k1").is_some());
        assert!(cache.get("k2").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let cache = MemoryCache::new(2);
        cache.insert("first".to_string(), entry(60));
        cache.insert("second".to_string(), entry(60));
        cache.insert("third".to_string(), entry(60));

        assert!(cache.get("first").is_none());
        assert!(cache.get("second").is_some());
        assert!(cache.get("third").is_some());
    }

    #[test]
    fn updating_a_key_moves_it_to_the_tail() {
        let cache = MemoryCache::new(2);
        cache.insert("first".to_string(), entry(60));
        cache.insert("second".to_string(), entry(60));
        // Refresh "first"; "second" is now the oldest.
        cache.insert("first".to_string(), entry(60));
        cache.insert("third".to_string(), entry(60));

        assert!(cache.get("first").is_some());
        assert!(cache.get("second").is_none());
    }

    #[test]
    fn reads_do_not_refresh_eviction_order() {
        let cache = MemoryCache::new(2);
        cache.insert("first".to_string(), entry(60));
        cache.insert("second".to_string(), entry(60));
        // Reading "first" must not save it from eviction.
        assert!(cache.get("first").is_some());
        cache.insert("third".to_string(), entry(60));

        assert!(cache.get("first").is_none());
        assert!(cache.get("second").is_some());
    }

    #[test]
    fn expired_entries_read_as_misses() {
        let cache = MemoryCache::new(10);
        cache.insert("k".to_string(), entry(0));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn remove_matching_filters_by_fragment() {
        let cache = MemoryCache::new(10);
        cache.insert("ai_cache:op:summarize|txt:a".to_string(), entry(60));
        cache.insert("ai_cache:op:sentiment|txt:a".to_string(), entry(60));

        let removed = cache.remove_matching("op:summarize");
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("ai_cache:op:sentiment|txt:a").is_some());
    }

    #[test]
    fn clear_empties_everything() {
        let cache = MemoryCache::new(10);
        cache.insert("a".to_string(), entry(60));
        cache.insert("b".to_string(), entry(60));
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache = MemoryCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert("k".to_string(), entry(60));
        assert_eq!(cache.len(), 1);
    }
}
