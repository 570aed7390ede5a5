//! Caching infrastructure.
//!
//! - **LRU Cache**: Generic sharded LRU cache for concurrent access
//! - **Keyed Store**: Shared store for cached pages and values, with
//!   prefix clearing
//! - **Entries**: Immutable page and field entries and their keys

pub(crate) mod entry;
mod lru;
mod store;

pub use entry::{CacheEntry, FieldCacheEntry, FieldKey, PageCacheEntry, PageKey};
pub use lru::{CacheStats, LruCache};
pub use store::{KeyedStore, MemoryStore};
