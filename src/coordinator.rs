//! Top-level cache coordination.
//!
//! The coordinator owns one [`TableCache`] per table, answers batch lookups
//! from the shared store, and sends misses to the data source together with
//! any pending preload hints. Source calls are retried with a fixed delay.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::batch::{BatchRequest, BatchResponse};
use crate::cache::entry::{field_page_prefix, page_prefix, source_prefix, table_prefix};
use crate::cache::{KeyedStore, MemoryStore};
use crate::invalidation::InvalidationDiff;
use crate::metrics::{CacheMetrics, Timer};
use crate::options::CacheOptions;
use crate::schema::ColumnClassifier;
use crate::source::DataSource;
use crate::table_cache::TableCache;
use crate::util::hash::identity_hash;
use crate::{Error, Result};

/// Read-through cache over one data source.
///
/// Create with [`CacheCoordinator::new`]; the coordinator is always held in
/// an `Arc` so table caches can reach back to it.
pub struct CacheCoordinator {
    /// Weak reference to self, handed to table caches.
    self_ref: Weak<CacheCoordinator>,
    source: Arc<dyn DataSource>,
    store: Arc<dyn KeyedStore>,
    options: CacheOptions,
    /// Hash of the source identity; first component of every store key.
    source_hash: u32,
    /// Registered table caches by name.
    tables: Mutex<HashMap<String, Arc<TableCache>>>,
    /// Creating thread, when restricted to one thread.
    owner: Option<ThreadId>,
    metrics: CacheMetrics,
}

impl CacheCoordinator {
    /// Create a coordinator over `source`, caching into `store`.
    pub fn new(source: Arc<dyn DataSource>, store: Arc<dyn KeyedStore>, options: CacheOptions) -> Result<Arc<Self>> {
        options.validate()?;
        let identity = source.data_source_identity();
        let source_hash = identity_hash(&identity);
        let owner = options.single_thread.then(|| thread::current().id());
        debug!(identity = %identity, source_hash, "creating cache coordinator");

        Ok(Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            source,
            store,
            options,
            source_hash,
            tables: Mutex::new(HashMap::new()),
            owner,
            metrics: CacheMetrics::new(),
        }))
    }

    /// Create a coordinator with default options and an in-memory store.
    pub fn with_defaults(source: Arc<dyn DataSource>) -> Result<Arc<Self>> {
        let options = CacheOptions::default();
        let store = Arc::new(MemoryStore::new(options.store_capacity));
        Self::new(source, store, options)
    }

    /// Get the cache of `name`, creating it on first access.
    ///
    /// The structure and classification are fetched under the registry
    /// lock, so racing first accesses reach the source once.
    pub fn table(&self, name: &str) -> Result<Arc<TableCache>> {
        self.check_thread()?;
        if name.is_empty() {
            return Err(Error::EmptyTableName);
        }

        let mut tables = self.tables.lock();
        if let Some(table) = tables.get(name) {
            return Ok(table.clone());
        }
        let table = Arc::new(self.build_table(name)?);
        tables.insert(name.to_string(), table.clone());
        self.metrics.tables.inc();
        debug!(table = %name, "registered table cache");
        Ok(table)
    }

    /// Names of the registered tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve `request`, loading whatever the store lacks.
    ///
    /// Misses go to the source in one round trip together with pending
    /// preload hints. Everything loaded is cached; only the requested
    /// entries are returned.
    pub fn load_batch(&self, request: &BatchRequest) -> Result<BatchResponse> {
        self.check_thread()?;

        let mut response = BatchResponse::new();
        let mut missing = BatchRequest::new();
        for lookup in request.iter() {
            match self.store.get_if_exists(&lookup.store_key()) {
                Some(entry) => {
                    self.metrics.store_hits.inc();
                    response.insert(entry);
                }
                None => {
                    self.metrics.store_misses.inc();
                    missing.add(lookup.clone());
                }
            }
        }
        if missing.is_empty() {
            return Ok(response);
        }

        let mut outgoing = missing.clone();
        let preloaded = self.merge_preloads(&mut outgoing);
        if self.options.trace_loads {
            debug!(misses = missing.len(), preloaded, request = %outgoing, "loading from source");
        }

        let loaded = self
            .load_from_source(&outgoing)
            .map_err(|err| err.for_request(&missing))?;
        loaded.to_cache(self.store.as_ref());

        for key in missing.keys() {
            match loaded.get(&key) {
                Some(entry) => response.insert(entry.clone()),
                None => return Err(Error::protocol(format!("source did not deliver {}", key))),
            }
        }
        Ok(response)
    }

    /// Call the source for `request`, retrying transient failures.
    ///
    /// Splits the request per table when the source or the options ask for
    /// it. A response missing any requested entry is a protocol violation
    /// and is not retried. When one table's part fails, the parts already
    /// loaded are cached and the failure names the whole `request`.
    pub fn load_from_source(&self, request: &BatchRequest) -> Result<BatchResponse> {
        if !(self.options.split_by_table || self.source.prefers_per_table_batches()) {
            return self.load_with_retry(request);
        }

        let mut response = BatchResponse::new();
        for part in request.split_by_table() {
            match self.load_with_retry(&part) {
                Ok(loaded) => response.merge(loaded),
                Err(err) => {
                    if !response.is_empty() {
                        response.to_cache(self.store.as_ref());
                        debug!(kept = response.len(), "cached loaded parts of a failed split load");
                    }
                    return Err(err.for_request(request));
                }
            }
        }
        Ok(response)
    }

    /// Apply an invalidation delivered by the authoritative side.
    ///
    /// Only the shared store is cleared; the source is not notified.
    pub fn invalidate(&self, diff: &InvalidationDiff) -> Result<()> {
        self.check_thread()?;
        if diff.is_empty() {
            return Ok(());
        }
        self.metrics.invalidations.inc();

        if diff.clears_all() {
            self.store.clear(&source_prefix(self.source_hash));
            info!("invalidated all cached entries");
            return Ok(());
        }

        for (table, pages) in diff.tables() {
            match pages {
                None => {
                    self.store.clear(&table_prefix(self.source_hash, table));
                    info!(table = %table, "invalidated table");
                }
                Some(pages) => {
                    for &first in pages {
                        self.store.clear(&page_prefix(self.source_hash, table, first));
                        self.store.clear(&field_page_prefix(self.source_hash, table, first));
                    }
                    info!(table = %table, pages = pages.len(), "invalidated pages");
                }
            }
        }
        Ok(())
    }

    /// Drop every entry of this source from the store.
    pub fn clear_all(&self) -> Result<()> {
        self.check_thread()?;
        self.store.clear(&source_prefix(self.source_hash));
        debug!(source_hash = self.source_hash, "cleared all cached entries");
        Ok(())
    }

    /// Fail unless called from the creating thread in single-thread mode.
    pub fn check_thread(&self) -> Result<()> {
        match self.owner {
            Some(owner) if owner != thread::current().id() => Err(Error::WrongThread),
            _ => Ok(()),
        }
    }

    /// Cache metrics.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Options in effect.
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Hash of the source identity.
    pub fn source_identity_hash(&self) -> u32 {
        self.source_hash
    }

    /// Shared keyed store.
    pub fn store(&self) -> &Arc<dyn KeyedStore> {
        &self.store
    }

    /// Data source.
    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    fn build_table(&self, name: &str) -> Result<TableCache> {
        let structure = self.source.table_structure(name)?;
        let mut classifier = match self.source.column_classification(name)? {
            Some(classifier) => {
                if classifier.column_count() != structure.len() {
                    return Err(Error::ClassificationMismatch {
                        table: name.to_string(),
                        expected: structure.len(),
                        actual: classifier.column_count(),
                    });
                }
                let mut classifier = classifier;
                if !classifier.is_frozen() {
                    classifier.bind(structure)?;
                }
                classifier
            }
            None => ColumnClassifier::new(structure),
        };
        classifier.freeze();
        Ok(TableCache::new(classifier, self.source_hash, self.self_ref.clone()))
    }

    /// Add the pending hints of every table to `request`.
    ///
    /// Pages already requested or already cached are skipped. Returns the
    /// number of pages added.
    fn merge_preloads(&self, request: &mut BatchRequest) -> usize {
        let tables: Vec<Arc<TableCache>> = self.tables.lock().values().cloned().collect();
        let mut added = 0;
        for table in tables {
            for first in table.take_preload_ids() {
                let page = table.page_request(first);
                if request.contains(&page.key.canonical()) {
                    continue;
                }
                if self.store.get_if_exists(&page.key.store_key()).is_some() {
                    continue;
                }
                request.add_page(page);
                added += 1;
            }
        }
        self.metrics.preload_pages.add(added as u64);
        added
    }

    fn load_with_retry(&self, request: &BatchRequest) -> Result<BatchResponse> {
        let attempts = self.options.repeat_count;
        let mut last = None;

        for attempt in 1..=attempts {
            self.metrics.source_calls.inc();
            let result = {
                let _timer = Timer::new(&self.metrics.load_latency);
                self.source.load_batch(request)
            };
            match result.and_then(|response| Self::check_complete(request, response)) {
                Ok(response) => {
                    self.metrics.batch_size.observe(request.len() as u64);
                    return Ok(response);
                }
                Err(err) if err.is_recoverable() => {
                    self.metrics.source_failures.inc();
                    if attempt == 1 && self.options.logs_first_failure() {
                        warn!(error = %err, attempt, attempts, lookups = request.len(), "data source call failed, retrying");
                    } else if self.options.trace_loads {
                        debug!(error = %err, attempt, attempts, request = %request, "data source call failed");
                    }
                    last = Some(err);
                    if attempt < attempts {
                        thread::sleep(self.options.repeat_delay);
                    }
                }
                Err(err) => {
                    self.metrics.load_failures.inc();
                    error!(error = %err, lookups = request.len(), "data source load failed");
                    return Err(err);
                }
            }
        }

        self.metrics.load_failures.inc();
        let last = last.unwrap_or_else(|| Error::internal("no load attempt made"));
        error!(error = %last, attempts, lookups = request.len(), "data source load failed after retries");
        Err(Error::LoadFailed {
            request: Box::new(request.clone()),
            attempts,
            last: Box::new(last),
        })
    }

    fn check_complete(request: &BatchRequest, response: BatchResponse) -> Result<BatchResponse> {
        let missing = response.missing(request);
        if missing.is_empty() {
            Ok(response)
        } else {
            Err(Error::protocol(format!(
                "source left {} of {} lookups unresolved: {}",
                missing.len(),
                request.len(),
                missing.join(", ")
            )))
        }
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("source_hash", &self.source_hash)
            .field("tables", &self.tables())
            .field("options", &self.options)
            .finish()
    }
}
