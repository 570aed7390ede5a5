//! Batched lookup requests.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::{FieldKey, PageKey};
use crate::util::hash::to_hex;

/// Lookup of one row page with a given column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page address.
    pub key: PageKey,
    /// Columns to fetch, id column included.
    pub columns: Vec<String>,
}

impl PageRequest {
    /// Create a page lookup; `first_id` is normalized to a page boundary.
    pub fn new(source: u32, table: impl Into<String>, first_id: i64, columns: Vec<String>) -> Self {
        Self {
            key: PageKey::new(source, table, first_id, &columns),
            columns,
        }
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.key.table
    }

    /// First row id of the page.
    pub fn first_id(&self) -> i64 {
        self.key.first_id
    }
}

/// Lookup of one individually cached value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRequest {
    /// Field address.
    pub key: FieldKey,
}

impl FieldRequest {
    /// Create a field lookup.
    pub fn new(source: u32, table: impl Into<String>, id: i64, column: impl Into<String>) -> Self {
        Self {
            key: FieldKey::new(source, table, id, column),
        }
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.key.table
    }
}

/// A single page or field lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lookup {
    /// Row page lookup.
    Page(PageRequest),
    /// Individual value lookup.
    Field(FieldRequest),
}

impl Lookup {
    /// Canonical batch key.
    pub fn canonical(&self) -> String {
        match self {
            Lookup::Page(p) => p.key.canonical(),
            Lookup::Field(f) => f.key.canonical(),
        }
    }

    /// Key tuple in the shared store.
    pub fn store_key(&self) -> Vec<String> {
        match self {
            Lookup::Page(p) => p.key.store_key(),
            Lookup::Field(f) => f.key.store_key(),
        }
    }

    /// Table name.
    pub fn table(&self) -> &str {
        match self {
            Lookup::Page(p) => p.table(),
            Lookup::Field(f) => f.table(),
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Page(p) => write!(
                f,
                "page {}[{}..{}] ({}) cols={}",
                p.table(),
                p.first_id(),
                crate::types::page_range(p.first_id()).end(),
                to_hex(p.key.columns_hash),
                p.columns.join(",")
            ),
            Lookup::Field(r) => write!(f, "field {}#{}.{}", r.table(), r.key.id, r.key.column),
        }
    }
}

/// Unordered set of lookups keyed by canonical key.
///
/// Insertion order is kept for rendering and splitting. Adding a lookup
/// whose key is already present replaces the earlier one in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Lookup>", into = "Vec<Lookup>")]
pub struct BatchRequest {
    entries: Vec<Lookup>,
    /// Map from canonical key to position in `entries`.
    index: HashMap<String, usize>,
}

impl BatchRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a lookup, replacing any lookup with the same key.
    pub fn add(&mut self, lookup: Lookup) {
        let key = lookup.canonical();
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos] = lookup,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(lookup);
            }
        }
    }

    /// Add a page lookup.
    pub fn add_page(&mut self, page: PageRequest) {
        self.add(Lookup::Page(page));
    }

    /// Add a field lookup.
    pub fn add_field(&mut self, field: FieldRequest) {
        self.add(Lookup::Field(field));
    }

    /// Union with `other`; entries of `other` win on duplicate keys.
    pub fn merge(&mut self, other: &BatchRequest) {
        for lookup in &other.entries {
            self.add(lookup.clone());
        }
    }

    /// Check if a lookup with this canonical key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Get a lookup by canonical key.
    pub fn get(&self, key: &str) -> Option<&Lookup> {
        self.index.get(key).map(|&pos| &self.entries[pos])
    }

    /// Number of lookups.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no lookups.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate lookups in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Lookup> {
        self.entries.iter()
    }

    /// Canonical keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(Lookup::canonical)
    }

    /// Distinct table names in order of first appearance.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for lookup in &self.entries {
            if !tables.contains(&lookup.table()) {
                tables.push(lookup.table());
            }
        }
        tables
    }

    /// Partition into one request per table.
    ///
    /// Order within each part follows this request.
    pub fn split_by_table(&self) -> Vec<BatchRequest> {
        let mut parts: Vec<(&str, BatchRequest)> = Vec::new();
        for lookup in &self.entries {
            match parts.iter_mut().find(|(table, _)| *table == lookup.table()) {
                Some((_, part)) => part.add(lookup.clone()),
                None => {
                    let mut part = BatchRequest::new();
                    part.add(lookup.clone());
                    parts.push((lookup.table(), part));
                }
            }
        }
        parts.into_iter().map(|(_, part)| part).collect()
    }
}

impl PartialEq for BatchRequest {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.entries.iter().all(|l| other.get(&l.canonical()) == Some(l))
    }
}

impl From<Vec<Lookup>> for BatchRequest {
    fn from(lookups: Vec<Lookup>) -> Self {
        let mut request = BatchRequest::new();
        for lookup in lookups {
            request.add(lookup);
        }
        request
    }
}

impl From<BatchRequest> for Vec<Lookup> {
    fn from(request: BatchRequest) -> Self {
        request.entries
    }
}

impl fmt::Display for BatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BatchRequest ({} lookups)", self.entries.len())?;
        for lookup in &self.entries {
            writeln!(f, "  {}", lookup)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    fn page(table: &str, first: i64) -> PageRequest {
        PageRequest::new(1, table, first, cols(&["Id", "Name"]))
    }

    #[test]
    fn test_add_deduplicates_by_key() {
        let mut req = BatchRequest::new();
        req.add_page(page("Person", 1));
        req.add_page(page("Person", 50)); // same page
        req.add_field(FieldRequest::new(1, "Person", 3, "Photo"));
        req.add_field(FieldRequest::new(1, "Person", 3, "Photo"));

        assert_eq!(req.len(), 2);
        assert!(req.contains("Person|3|Photo"));
    }

    #[test]
    fn test_merge_is_idempotent_and_last_write_wins() {
        let mut a = BatchRequest::new();
        a.add_page(page("Person", 1));

        let mut b = BatchRequest::new();
        let replacement = PageRequest {
            key: page("Person", 1).key,
            columns: cols(&["Id", "Name", "Extra"]),
        };
        b.add_page(replacement.clone());
        b.add_field(FieldRequest::new(1, "Company", 9, "Logo"));

        a.merge(&b);
        let once = a.clone();
        a.merge(&b);

        assert_eq!(a, once);
        assert_eq!(a.len(), 2);
        let key = replacement.key.canonical();
        assert_eq!(a.get(&key), Some(&Lookup::Page(replacement)));
    }

    #[test]
    fn test_split_by_table_preserves_order_within_table() {
        let mut req = BatchRequest::new();
        req.add_page(page("Person", 201));
        req.add_field(FieldRequest::new(1, "Company", 2, "Logo"));
        req.add_page(page("Person", 1));
        req.add_field(FieldRequest::new(1, "Person", 5, "Photo"));

        let parts = req.split_by_table();
        assert_eq!(parts.len(), 2);

        let person = parts
            .iter()
            .find(|p| p.tables() == vec!["Person"])
            .unwrap();
        let firsts: Vec<String> = person.keys().collect();
        assert_eq!(
            firsts,
            vec![
                page("Person", 201).key.canonical(),
                page("Person", 1).key.canonical(),
                "Person|5|Photo".to_string(),
            ]
        );
        assert_eq!(parts.iter().map(|p| p.len()).sum::<usize>(), req.len());
    }

    #[test]
    fn test_display_lists_lookups() {
        let mut req = BatchRequest::new();
        req.add_page(page("Person", 101));
        req.add_field(FieldRequest::new(1, "Person", 7, "Photo"));

        let text = req.to_string();
        assert!(text.starts_with("BatchRequest (2 lookups)"));
        assert!(text.contains("page Person[101..200]"));
        assert!(text.contains("field Person#7.Photo"));
    }

    #[test]
    fn test_empty_request() {
        let req = BatchRequest::new();
        assert!(req.is_empty());
        assert!(req.split_by_table().is_empty());
    }
}
