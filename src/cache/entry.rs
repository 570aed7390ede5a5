//! Cached page and field entries and their keys.
//!
//! Store key layout:
//!
//! ```text
//! page:  [source, table, "p", first_id, column_hash]
//! field: [source, table, "f", first_id, id, column]
//! ```
//!
//! so a table prefix, a page prefix or a single row prefix clears every
//! entry beneath it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{first_page_id, page_range, RowSet, Value};
use crate::util::hash::{column_list_hash, to_hex};
use crate::{Error, Result};

const PAGE_SEGMENT: &str = "p";
const FIELD_SEGMENT: &str = "f";

/// Prefix covering every entry of a data source.
pub fn source_prefix(source: u32) -> Vec<String> {
    vec![to_hex(source)]
}

/// Prefix covering every page and field entry of a table.
pub fn table_prefix(source: u32, table: &str) -> Vec<String> {
    vec![to_hex(source), table.to_string()]
}

/// Prefix covering every column variant of one page.
pub fn page_prefix(source: u32, table: &str, first_id: i64) -> Vec<String> {
    vec![
        to_hex(source),
        table.to_string(),
        PAGE_SEGMENT.to_string(),
        first_id.to_string(),
    ]
}

/// Prefix covering the individual values of every row in one page.
pub fn field_page_prefix(source: u32, table: &str, first_id: i64) -> Vec<String> {
    vec![
        to_hex(source),
        table.to_string(),
        FIELD_SEGMENT.to_string(),
        first_id.to_string(),
    ]
}

/// Prefix covering the individual values of one row.
pub fn field_row_prefix(source: u32, table: &str, id: i64) -> Vec<String> {
    let mut key = field_page_prefix(source, table, first_page_id(id));
    key.push(id.to_string());
    key
}

/// Address of a cached row page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageKey {
    /// Hash of the data source identity.
    pub source: u32,
    /// Table name.
    pub table: String,
    /// First row id covered by the page.
    pub first_id: i64,
    /// Hash of the participating column list.
    pub columns_hash: u32,
}

impl PageKey {
    /// Create a page key; `first_id` is normalized to a page boundary.
    pub fn new<S: AsRef<str>>(source: u32, table: impl Into<String>, first_id: i64, columns: &[S]) -> Self {
        Self {
            source,
            table: table.into(),
            first_id: first_page_id(first_id),
            columns_hash: column_list_hash(columns),
        }
    }

    /// Key tuple in the shared store.
    pub fn store_key(&self) -> Vec<String> {
        let mut key = page_prefix(self.source, &self.table, self.first_id);
        key.push(to_hex(self.columns_hash));
        key
    }

    /// Canonical batch key: `table|columnListSignature|firstId`.
    pub fn canonical(&self) -> String {
        format!("{}|{}|{}", self.table, to_hex(self.columns_hash), self.first_id)
    }
}

/// Address of an individually cached value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldKey {
    /// Hash of the data source identity.
    pub source: u32,
    /// Table name.
    pub table: String,
    /// Row id.
    pub id: i64,
    /// Column name.
    pub column: String,
}

impl FieldKey {
    /// Create a field key.
    pub fn new(source: u32, table: impl Into<String>, id: i64, column: impl Into<String>) -> Self {
        Self {
            source,
            table: table.into(),
            id,
            column: column.into(),
        }
    }

    /// Key tuple in the shared store.
    pub fn store_key(&self) -> Vec<String> {
        let mut key = field_row_prefix(self.source, &self.table, self.id);
        key.push(self.column.clone());
        key
    }

    /// Canonical batch key: `table|id|columnName`.
    pub fn canonical(&self) -> String {
        format!("{}|{}|{}", self.table, self.id, self.column)
    }
}

/// One cached page of rows. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCacheEntry {
    key: PageKey,
    rows: RowSet,
}

impl PageCacheEntry {
    /// Create a page entry.
    ///
    /// Rows outside the page range are dropped. The row columns must match
    /// the column hash of the key.
    pub fn new(key: PageKey, rows: RowSet) -> Result<Self> {
        if column_list_hash(rows.columns()) != key.columns_hash {
            return Err(Error::protocol(format!(
                "page {} delivered with columns {:?}",
                key.canonical(),
                rows.columns()
            )));
        }
        let range = page_range(key.first_id);
        let rows = if rows.ids().all(|id| range.contains(&id)) {
            rows
        } else {
            rows.filter_ids(|id| range.contains(&id))
        };
        Ok(Self { key, rows })
    }

    /// Page key.
    pub fn key(&self) -> &PageKey {
        &self.key
    }

    /// First row id covered.
    pub fn first_id(&self) -> i64 {
        self.key.first_id
    }

    /// Cached rows.
    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    /// Column names, id column included.
    pub fn columns(&self) -> &[String] {
        self.rows.columns()
    }

    /// Check if the page holds row `id`.
    pub fn contains(&self, id: i64) -> bool {
        self.rows.contains(id)
    }

    /// Value of one column of one row.
    pub fn value(&self, id: i64, column: &str) -> Option<&Value> {
        self.rows.value(id, column)
    }

    /// New page restricted to `columns`, with the column hash recomputed.
    pub fn project(&self, columns: &[String]) -> Result<PageCacheEntry> {
        let rows = self.rows.project(columns)?;
        let key = PageKey::new(self.key.source, self.key.table.clone(), self.key.first_id, rows.columns());
        Ok(Self { key, rows })
    }

    /// New page with `(id, column position, value)` patches applied.
    ///
    /// Returns the page and the number of patches that hit a cached row.
    pub fn with_updates(&self, updates: &[(i64, usize, Value)]) -> (PageCacheEntry, usize) {
        let mut rows = self.rows.clone();
        let applied = updates
            .iter()
            .filter(|(id, column, value)| rows.set_value(*id, *column, value.clone()))
            .count();
        (
            Self {
                key: self.key.clone(),
                rows,
            },
            applied,
        )
    }
}

/// One individually cached value. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCacheEntry {
    key: FieldKey,
    value: Value,
}

impl FieldCacheEntry {
    /// Create a field entry; text is trimmed of trailing whitespace.
    pub fn new(key: FieldKey, value: Value) -> Self {
        Self {
            key,
            value: value.trimmed(),
        }
    }

    /// Field key.
    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    /// Cached value.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Anything the shared store holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheEntry {
    /// A row page.
    Page(Arc<PageCacheEntry>),
    /// An individual value.
    Field(Arc<FieldCacheEntry>),
}

impl CacheEntry {
    /// Key tuple in the shared store.
    pub fn store_key(&self) -> Vec<String> {
        match self {
            CacheEntry::Page(p) => p.key().store_key(),
            CacheEntry::Field(f) => f.key().store_key(),
        }
    }

    /// Canonical batch key.
    pub fn canonical(&self) -> String {
        match self {
            CacheEntry::Page(p) => p.key().canonical(),
            CacheEntry::Field(f) => f.key().canonical(),
        }
    }

    /// The page, if this is one.
    pub fn as_page(&self) -> Option<&Arc<PageCacheEntry>> {
        match self {
            CacheEntry::Page(p) => Some(p),
            CacheEntry::Field(_) => None,
        }
    }

    /// The field, if this is one.
    pub fn as_field(&self) -> Option<&Arc<FieldCacheEntry>> {
        match self {
            CacheEntry::Field(f) => Some(f),
            CacheEntry::Page(_) => None,
        }
    }
}

impl From<PageCacheEntry> for CacheEntry {
    fn from(page: PageCacheEntry) -> Self {
        CacheEntry::Page(Arc::new(page))
    }
}

impl From<FieldCacheEntry> for CacheEntry {
    fn from(field: FieldCacheEntry) -> Self {
        CacheEntry::Field(Arc::new(field))
    }
}
