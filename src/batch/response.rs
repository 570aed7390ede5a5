//! Batched lookup responses.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, FieldCacheEntry, KeyedStore, PageCacheEntry};
use crate::types::{RowSet, Value};
use crate::Result;

use super::request::{BatchRequest, FieldRequest, PageRequest};

/// Entries delivered for a batch request, keyed by canonical key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    entries: HashMap<String, CacheEntry>,
}

impl BatchResponse {
    /// Create an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any entry with the same key.
    pub fn insert(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.canonical(), entry);
    }

    /// Answer a page lookup with the given rows.
    ///
    /// Fails if the rows do not carry exactly the requested columns.
    pub fn insert_page(&mut self, request: &PageRequest, rows: RowSet) -> Result<()> {
        let page = PageCacheEntry::new(request.key.clone(), rows)?;
        self.insert(page.into());
        Ok(())
    }

    /// Answer a field lookup with the given value.
    pub fn insert_field(&mut self, request: &FieldRequest, value: Value) {
        self.insert(FieldCacheEntry::new(request.key.clone(), value).into());
    }

    /// Get an entry by canonical key.
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Get a page entry by canonical key.
    pub fn page(&self, key: &str) -> Option<&Arc<PageCacheEntry>> {
        self.entries.get(key).and_then(CacheEntry::as_page)
    }

    /// Get a field entry by canonical key.
    pub fn field(&self, key: &str) -> Option<&Arc<FieldCacheEntry>> {
        self.entries.get(key).and_then(CacheEntry::as_field)
    }

    /// Check if an entry with this key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }

    /// Union with `other`; entries of `other` win on duplicate keys.
    pub fn merge(&mut self, other: BatchResponse) {
        self.entries.extend(other.entries);
    }

    /// Canonical keys of `request` with no entry in this response.
    pub fn missing(&self, request: &BatchRequest) -> Vec<String> {
        request.keys().filter(|k| !self.entries.contains_key(k)).collect()
    }

    /// Write every entry to the store under its store key.
    pub fn to_cache(&self, store: &dyn KeyedStore) {
        for entry in self.entries.values() {
            store.set(entry.store_key(), entry.clone());
        }
    }
}

impl FromIterator<CacheEntry> for BatchResponse {
    fn from_iter<I: IntoIterator<Item = CacheEntry>>(iter: I) -> Self {
        let mut response = BatchResponse::new();
        for entry in iter {
            response.insert(entry);
        }
        response
    }
}
