//! # rowcache
//!
//! A two-level read-through cache for rows and individual column values
//! fetched from a relational data source.
//!
//! ## Features
//!
//! - **Row pages**: rows are cached in fixed blocks of 100 ids
//! - **Individual values**: large payload columns are cached one value at a time
//! - **Batched loading**: misses go to the source in one round trip, with retry
//! - **Preload hints**: predicted pages ride along with the next real miss
//! - **Reference paths**: `"Employer.Name"` follows references across tables
//! - **Invalidation**: table, page and row level clearing, in-place row updates
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rowcache::{CacheCoordinator, ColumnKind, MemorySource, TableStructure};
//!
//! let source = Arc::new(MemorySource::new("memory://hr"));
//! source.add_table(
//!     TableStructure::new("Person")?
//!         .with_column("Name", ColumnKind::Text)?
//!         .with_column("Photo", ColumnKind::Binary)?,
//! );
//! source.upsert_row("Person", vec![1.into(), "Ann".into(), vec![0u8; 4].into()])?;
//!
//! let cache = CacheCoordinator::with_defaults(source)?;
//! let people = cache.table("Person")?;
//! let name = people.get_value(1, "Name")?;   // loads page [1, 100]
//! let photo = people.get_value(1, "Photo")?; // loads one value
//! ```

// Public modules
pub mod batch;
pub mod error;
pub mod options;
pub mod schema;
pub mod source;
pub mod types;

// Internal modules
mod cache;
mod coordinator;
mod invalidation;
mod metrics;
mod table_cache;
mod util;
mod working_set;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use options::{CacheOptions, CacheOptionsBuilder};
pub use types::{
    check_row_id, checked_first_page_id, first_page_id, page_range, RowSet, Value, ID_COLUMN, NO_ROW,
    PAGE_SIZE,
};

// Schema
pub use schema::{ColumnClassifier, ColumnDef, ColumnKind, ColumnRef, TableStructure};

// Batches
pub use batch::{BatchRequest, BatchResponse, FieldRequest, Lookup, PageRequest};

// Cache
pub use cache::{
    CacheEntry, CacheStats, FieldCacheEntry, FieldKey, KeyedStore, LruCache, MemoryStore,
    PageCacheEntry, PageKey,
};
pub use coordinator::CacheCoordinator;
pub use invalidation::InvalidationDiff;
pub use table_cache::TableCache;
pub use working_set::WorkingSet;

// Sources
pub use source::{ClearedPages, DataSource, MemorySource};

// Metrics
pub use metrics::{CacheMetrics, Counter, Gauge, Histogram, MetricsSummary, Timer};
