//! Data source boundary.
//!
//! A [`DataSource`] executes lookups against the authoritative store. The
//! cache calls it only on a miss, always with a whole [`BatchRequest`].

mod memory;

pub use memory::{ClearedPages, MemorySource};

use crate::batch::{BatchRequest, BatchResponse};
use crate::schema::{ColumnClassifier, TableStructure};
use crate::Result;

/// Authoritative side of the cache.
///
/// Implementations must be safe to call from several threads, or be owned
/// exclusively by one coordinator.
pub trait DataSource: Send + Sync {
    /// Stable identity of the backing store.
    fn data_source_identity(&self) -> String;

    /// Column structure of a table.
    fn table_structure(&self, table: &str) -> Result<TableStructure>;

    /// Explicit column classification, or `None` for the defaults.
    fn column_classification(&self, table: &str) -> Result<Option<ColumnClassifier>>;

    /// Resolve every lookup in `request`.
    ///
    /// Leaving out a requested entry is a protocol violation. Transient
    /// failures should be reported as [`crate::Error::Source`] so that the
    /// caller retries them.
    fn load_batch(&self, request: &BatchRequest) -> Result<BatchResponse>;

    /// Forward a page invalidation upstream.
    ///
    /// An empty `first_ids` slice means every page of the table.
    fn clear_pages(&self, table: &str, columns: &[String], first_ids: &[i64]) -> Result<()>;

    /// Whether requests should be split into one round trip per table.
    fn prefers_per_table_batches(&self) -> bool {
        false
    }
}
