//! Shared keyed cache store.
//!
//! The engine only relies on per-key atomicity at this boundary and never
//! holds one of its own locks while calling into the store.

use std::sync::Arc;

use crate::options::DEFAULT_STORE_CAPACITY;

use super::entry::CacheEntry;
use super::lru::{CacheStats, LruCache};

/// Storage substrate for cached pages and values.
///
/// Keys are ordered string tuples. `clear` with a shorter tuple than was
/// used for `set` removes every entry whose key starts with it.
pub trait KeyedStore: Send + Sync {
    /// Get an entry if present.
    fn get_if_exists(&self, key: &[String]) -> Option<CacheEntry>;

    /// Insert or replace an entry.
    fn set(&self, key: Vec<String>, value: CacheEntry);

    /// Remove every entry whose key starts with `prefix`.
    fn clear(&self, prefix: &[String]);
}

/// In-memory store backed by the sharded LRU cache.
pub struct MemoryStore {
    cache: LruCache<Vec<String>, CacheEntry>,
}

impl MemoryStore {
    /// Create a store holding at most about `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get store statistics.
    pub fn stats(&self) -> Arc<CacheStats> {
        self.cache.stats()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_CAPACITY)
    }
}

impl KeyedStore for MemoryStore {
    fn get_if_exists(&self, key: &[String]) -> Option<CacheEntry> {
        self.cache.get(key)
    }

    fn set(&self, key: Vec<String>, value: CacheEntry) {
        self.cache.insert(key, value);
    }

    fn clear(&self, prefix: &[String]) {
        if prefix.is_empty() {
            self.cache.clear();
        } else {
            self.cache.retain(|key| !key.starts_with(prefix));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::{table_prefix, FieldCacheEntry, FieldKey};
    use crate::types::Value;

    fn field(table: &str, id: i64, column: &str, value: i64) -> CacheEntry {
        FieldCacheEntry::new(FieldKey::new(1, table, id, column), Value::Int(value)).into()
    }

    #[test]
    fn test_store_set_and_get() {
        let store = MemoryStore::new(100);
        let entry = field("T", 1, "A", 10);
        let key = entry.store_key();

        assert!(store.get_if_exists(&key).is_none());
        store.set(key.clone(), entry.clone());
        assert_eq!(store.get_if_exists(&key), Some(entry));
    }

    #[test]
    fn test_store_prefix_clear() {
        let store = MemoryStore::new(100);
        for (table, id) in [("T", 1), ("T", 2), ("T", 150), ("U", 1)] {
            let entry = field(table, id, "A", id);
            store.set(entry.store_key(), entry);
        }
        assert_eq!(store.len(), 4);

        store.clear(&table_prefix(1, "T"));
        assert_eq!(store.len(), 1);
        assert!(store.get_if_exists(&field("U", 1, "A", 1).store_key()).is_some());

        // Clearing again is a no-op
        store.clear(&table_prefix(1, "T"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_prefix_does_not_match_partial_segment() {
        let store = MemoryStore::new(100);
        let entry = field("Tab", 1, "A", 1);
        store.set(entry.store_key(), entry);

        store.clear(&table_prefix(1, "T"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_empty_prefix_clears_all() {
        let store = MemoryStore::default();
        let entry = field("T", 1, "A", 1);
        store.set(entry.store_key(), entry);
        store.clear(&[]);
        assert!(store.is_empty());
    }
}
