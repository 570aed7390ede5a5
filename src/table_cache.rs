//! Per-table cache logic.
//!
//! A `TableCache` turns value lookups into page and field lookups against
//! its coordinator. Rows travel in pages of [`PAGE_SIZE`] ids; columns
//! classified as individual are fetched one value at a time. Dotted column
//! names (`"Employer.Name"`) follow reference columns into other tables.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::batch::{BatchRequest, BatchResponse, FieldRequest, PageRequest};
use crate::cache::entry::{field_row_prefix, page_prefix, table_prefix};
use crate::cache::{CacheEntry, FieldCacheEntry, FieldKey, PageCacheEntry, PageKey};
use crate::coordinator::CacheCoordinator;
use crate::schema::{ColumnClassifier, TableStructure};
use crate::types::{check_row_id, first_page_id, RowSet, Value, ID_COLUMN, NO_ROW, PAGE_SIZE};
use crate::working_set::WorkingSet;
use crate::{Error, Result};

/// How one requested column of `get_values` is answered.
enum Slot<'a> {
    /// From the row page.
    Page(&'a str),
    /// From an individual value.
    Field(String),
    /// Through a reference path.
    Path(&'a str),
}

/// Cache of one table's pages and individual values.
pub struct TableCache {
    name: String,
    /// Frozen classification, bound to the table structure.
    classifier: ColumnClassifier,
    /// Page-cached columns, id column first.
    page_columns: Vec<String>,
    source_hash: u32,
    /// Weak reference to the owning coordinator.
    coordinator: Weak<CacheCoordinator>,
    /// First ids of hinted pages.
    preload: Mutex<BTreeSet<i64>>,
}

impl TableCache {
    pub(crate) fn new(classifier: ColumnClassifier, source_hash: u32, coordinator: Weak<CacheCoordinator>) -> Self {
        Self {
            name: classifier.structure().name().to_string(),
            page_columns: classifier.page_columns(),
            classifier,
            source_hash,
            coordinator,
            preload: Mutex::new(BTreeSet::new()),
        }
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table structure.
    pub fn structure(&self) -> &TableStructure {
        self.classifier.structure()
    }

    /// Column classification.
    pub fn classifier(&self) -> &ColumnClassifier {
        &self.classifier
    }

    /// Page-cached columns, id column first.
    pub fn page_columns(&self) -> &[String] {
        &self.page_columns
    }

    /// Lookup for the full page owning `id`.
    pub fn page_request(&self, id: i64) -> PageRequest {
        PageRequest::new(self.source_hash, self.name.clone(), id, self.page_columns.clone())
    }

    /// Lookup for one individual value.
    pub fn field_request(&self, id: i64, column: &str) -> FieldRequest {
        FieldRequest::new(self.source_hash, self.name.clone(), id, column)
    }

    /// Get one value.
    ///
    /// Id 0 yields NULL. `column` may be a dotted reference path.
    pub fn get_value(&self, id: i64, column: &str) -> Result<Value> {
        self.get_value_in(id, column, None)
    }

    /// Get one value, preferring rows buffered in `working_set`.
    pub fn get_value_in(&self, id: i64, column: &str, working_set: Option<&WorkingSet>) -> Result<Value> {
        let coordinator = self.coordinator()?;
        coordinator.check_thread()?;
        coordinator.metrics().lookups.inc();
        self.resolve(&coordinator, id, column, working_set)
    }

    /// Get several values of one row, aligned with `columns`.
    ///
    /// The row page is fetched at most once and all individual values are
    /// loaded in a single batch.
    pub fn get_values<S: AsRef<str>>(&self, id: i64, columns: &[S]) -> Result<Vec<Value>> {
        let coordinator = self.coordinator()?;
        coordinator.check_thread()?;
        coordinator.metrics().lookups.add(columns.len() as u64);

        if id == NO_ROW {
            return Ok(vec![Value::Null; columns.len()]);
        }
        check_row_id(id)?;

        let mut slots = Vec::with_capacity(columns.len());
        let mut fields = BatchRequest::new();
        for column in columns {
            let column = column.as_ref();
            if let Some((head, _)) = column.split_once('.') {
                self.reference_target(head)?;
                slots.push(Slot::Path(column));
            } else if self.classifier.is_individual_at(self.column_index(column)?) {
                let request = self.field_request(id, column);
                slots.push(Slot::Field(request.key.canonical()));
                fields.add_field(request);
            } else {
                slots.push(Slot::Page(column));
            }
        }

        let page = if slots.iter().any(|s| matches!(s, Slot::Page(_))) {
            Some(self.row_page(&coordinator, id)?)
        } else {
            None
        };
        let loaded = if fields.is_empty() {
            BatchResponse::new()
        } else {
            coordinator.load_batch(&fields)?
        };

        slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Page(column) => match &page {
                    Some(page) => page_value(page, id, column),
                    None => Err(Error::internal("row page not loaded")),
                },
                Slot::Field(key) => loaded
                    .field(&key)
                    .map(|f| f.value().clone())
                    .ok_or_else(|| Error::protocol(format!("no value delivered for {}", key))),
                Slot::Path(column) => self.resolve(&coordinator, id, column, None),
            })
            .collect()
    }

    /// Resolve `dotted` (`"Reference.Column"`) for the referenced row `ref_id`.
    ///
    /// Reference id 0 yields NULL without any lookup.
    pub fn get_ref_value(&self, dotted: &str, ref_id: i64, working_set: Option<&WorkingSet>) -> Result<Value> {
        let coordinator = self.coordinator()?;
        coordinator.check_thread()?;
        coordinator.metrics().lookups.inc();

        let (head, rest) = dotted.split_once('.').ok_or_else(|| Error::NotAReference {
            table: self.name.clone(),
            column: dotted.to_string(),
        })?;
        let target = self.reference_target(head)?;
        if ref_id == NO_ROW {
            return Ok(Value::Null);
        }
        let master = coordinator.table(target)?;
        master.resolve(&coordinator, ref_id, rest, working_set)
    }

    /// Materialize a standalone result for `ids` and `columns`.
    ///
    /// The id column leads unless requested explicitly. Duplicate ids are
    /// collapsed; id 0 gives a row of NULLs. Every page involved is hinted
    /// first so the first miss fetches them together.
    pub fn create_projection<S: AsRef<str>>(&self, ids: &[i64], columns: &[S]) -> Result<RowSet> {
        let names: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let mut header = Vec::with_capacity(names.len() + 1);
        let lead_id = !names.iter().any(|c| c == ID_COLUMN);
        if lead_id {
            header.push(ID_COLUMN.to_string());
        }
        header.extend(names.iter().cloned());
        let mut result = RowSet::new(header)?;

        self.add_preload_ids(ids.iter().copied());

        let mut seen = HashSet::new();
        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            let row = if id == NO_ROW {
                result
                    .columns()
                    .iter()
                    .map(|c| if c == ID_COLUMN { Value::Int(NO_ROW) } else { Value::Null })
                    .collect()
            } else {
                let mut row = Vec::with_capacity(result.columns().len());
                if lead_id {
                    row.push(Value::Int(id));
                }
                row.extend(self.get_values(id, &names)?);
                row
            };
            result.push(row)?;
        }
        Ok(result)
    }

    /// Hint that the page owning `id` will be needed soon.
    pub fn add_preload_id(&self, id: i64) {
        self.add_preload_ids(std::iter::once(id));
    }

    /// Hint that the pages owning `ids` will be needed soon.
    pub fn add_preload_ids<I: IntoIterator<Item = i64>>(&self, ids: I) {
        let mut preload = self.preload.lock();
        preload.extend(
            ids.into_iter()
                .filter(|&id| id != NO_ROW && check_row_id(id).is_ok())
                .map(first_page_id),
        );
    }

    /// Hinted page first ids not yet consumed.
    pub fn pending_preloads(&self) -> Vec<i64> {
        self.preload.lock().iter().copied().collect()
    }

    /// Take and clear the hinted page first ids.
    pub(crate) fn take_preload_ids(&self) -> Vec<i64> {
        std::mem::take(&mut *self.preload.lock()).into_iter().collect()
    }

    /// Drop every cached page and value of this table.
    pub fn clear(&self) -> Result<()> {
        let coordinator = self.coordinator()?;
        coordinator.check_thread()?;
        coordinator.store().clear(&table_prefix(self.source_hash, &self.name));
        debug!(table = %self.name, "cleared table cache");
        coordinator.source().clear_pages(&self.name, &self.page_columns, &[])
    }

    /// Drop the cached page and values of one row.
    pub fn clear_id(&self, id: i64) -> Result<()> {
        self.clear_ids(&[id])
    }

    /// Drop the cached pages and values of several rows.
    pub fn clear_ids(&self, ids: &[i64]) -> Result<()> {
        let coordinator = self.coordinator()?;
        coordinator.check_thread()?;
        let store = coordinator.store();

        let mut pages = BTreeSet::new();
        for &id in ids.iter().filter(|&&id| id != NO_ROW) {
            check_row_id(id)?;
            store.clear(&field_row_prefix(self.source_hash, &self.name, id));
            pages.insert(first_page_id(id));
        }
        if pages.is_empty() {
            return Ok(());
        }
        for &first in &pages {
            store.clear(&page_prefix(self.source_hash, &self.name, first));
        }
        let pages: Vec<i64> = pages.into_iter().collect();
        debug!(table = %self.name, pages = ?pages, "cleared pages");
        coordinator.source().clear_pages(&self.name, &self.page_columns, &pages)
    }

    /// Patch cached pages and values with authoritative `fresh` rows.
    ///
    /// Pages and values not currently cached are left alone. Returns the
    /// number of rows that touched at least one cached entry.
    pub fn update_rows(&self, fresh: &RowSet) -> Result<usize> {
        let coordinator = self.coordinator()?;
        coordinator.check_thread()?;
        let store = coordinator.store();

        // Column correspondence: (fresh position, page position) and
        // (fresh position, column name) for individual values.
        let mut page_updates = Vec::new();
        let mut field_updates = Vec::new();
        for (i, column) in fresh.columns().iter().enumerate() {
            if i == fresh.id_column() {
                continue;
            }
            let index = self.column_index(column)?;
            if self.classifier.is_individual_at(index) {
                field_updates.push((i, column.as_str()));
            } else if let Some(pos) = self.page_columns.iter().position(|c| c == column) {
                page_updates.push((i, pos));
            }
        }

        let id_column = fresh.id_column();
        let mut by_page: BTreeMap<i64, Vec<(i64, &[Value])>> = BTreeMap::new();
        for row in fresh.rows() {
            if let Some(id) = row[id_column].as_int() {
                check_row_id(id)?;
                by_page.entry(first_page_id(id)).or_default().push((id, row));
            }
        }

        let mut patched = 0;
        for (first, rows) in by_page {
            let mut touched = HashSet::new();

            if !page_updates.is_empty() {
                let key = PageKey::new(self.source_hash, self.name.clone(), first, &self.page_columns).store_key();
                if let Some(CacheEntry::Page(page)) = store.get_if_exists(&key) {
                    let updates: Vec<(i64, usize, Value)> = rows
                        .iter()
                        .flat_map(|&(id, row)| page_updates.iter().map(move |&(i, pos)| (id, pos, row[i].clone())))
                        .collect();
                    let (updated, _) = page.with_updates(&updates);
                    touched.extend(rows.iter().map(|&(id, _)| id).filter(|&id| page.contains(id)));
                    // Projections of the old page are stale now.
                    store.clear(&page_prefix(self.source_hash, &self.name, first));
                    store.set(key, updated.into());
                }
            }

            for &(id, row) in &rows {
                for &(i, column) in &field_updates {
                    let key = FieldKey::new(self.source_hash, self.name.clone(), id, column);
                    let store_key = key.store_key();
                    if store.get_if_exists(&store_key).is_some() {
                        store.set(store_key, FieldCacheEntry::new(key, row[i].clone()).into());
                        touched.insert(id);
                    }
                }
            }
            patched += touched.len();
        }

        coordinator.metrics().rows_patched.add(patched as u64);
        debug!(table = %self.name, rows = fresh.len(), patched, "updated cached rows");
        Ok(patched)
    }

    /// Get the cached page holding row `id`.
    ///
    /// If the page is cached but lacks the row, it is cleared and reloaded
    /// once before the row is reported missing.
    pub fn get_row_page(&self, id: i64) -> Result<Arc<PageCacheEntry>> {
        let coordinator = self.coordinator()?;
        coordinator.check_thread()?;
        check_row_id(id)?;
        self.row_page(&coordinator, id)
    }

    /// Get the page starting at `first_id`, optionally restricted to
    /// `columns`.
    ///
    /// A restricted page is projected from the full page, which is loaded
    /// if needed, and cached under its own column hash.
    pub fn get_page(&self, first_id: i64, columns: Option<&[String]>) -> Result<Arc<PageCacheEntry>> {
        let coordinator = self.coordinator()?;
        coordinator.check_thread()?;
        check_row_id(first_id)?;
        let first = first_page_id(first_id);

        let Some(columns) = columns else {
            return self.fetch_page(&coordinator, first);
        };

        let mut projected = Vec::with_capacity(columns.len() + 1);
        if !columns.iter().any(|c| c == ID_COLUMN) {
            projected.push(ID_COLUMN.to_string());
        }
        for column in columns {
            let index = self.column_index(column)?;
            if self.classifier.is_individual_at(index) {
                return Err(Error::InvalidConfiguration(format!(
                    "column '{}' of '{}' is cached individually",
                    column, self.name
                )));
            }
            projected.push(column.clone());
        }
        if projected == self.page_columns {
            return self.fetch_page(&coordinator, first);
        }

        let key = PageKey::new(self.source_hash, self.name.clone(), first, &projected);
        if let Some(CacheEntry::Page(page)) = coordinator.store().get_if_exists(&key.store_key()) {
            return Ok(page);
        }
        let page = Arc::new(self.fetch_page(&coordinator, first)?.project(&projected)?);
        coordinator
            .store()
            .set(page.key().store_key(), CacheEntry::Page(page.clone()));
        Ok(page)
    }

    fn coordinator(&self) -> Result<Arc<CacheCoordinator>> {
        self.coordinator
            .upgrade()
            .ok_or_else(|| Error::internal("cache coordinator has been dropped"))
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.structure()
            .column_index(column)
            .ok_or_else(|| Error::unknown_column(&self.name, column))
    }

    /// Table referenced by column `head`.
    fn reference_target(&self, head: &str) -> Result<&str> {
        let column = self
            .structure()
            .column_by_name(head)
            .ok_or_else(|| Error::unknown_column(&self.name, head))?;
        column.kind.reference_target().ok_or_else(|| Error::NotAReference {
            table: self.name.clone(),
            column: head.to_string(),
        })
    }

    fn resolve(
        &self,
        coordinator: &CacheCoordinator,
        id: i64,
        column: &str,
        working_set: Option<&WorkingSet>,
    ) -> Result<Value> {
        if id == NO_ROW {
            return Ok(Value::Null);
        }
        check_row_id(id)?;
        let Some((head, rest)) = column.split_once('.') else {
            return self.plain_value(coordinator, id, column, working_set);
        };

        let target = self.reference_target(head)?;
        let value = self.plain_value(coordinator, id, head, working_set)?;
        let ref_id = value.reference_id().ok_or_else(|| {
            Error::InvalidRow(format!(
                "reference '{}' of '{}' row {} holds {}",
                head, self.name, id, value
            ))
        })?;
        if ref_id == NO_ROW {
            return Ok(Value::Null);
        }
        coordinator.table(target)?.resolve(coordinator, ref_id, rest, working_set)
    }

    fn plain_value(
        &self,
        coordinator: &CacheCoordinator,
        id: i64,
        column: &str,
        working_set: Option<&WorkingSet>,
    ) -> Result<Value> {
        let index = self.column_index(column)?;
        if let Some(value) = working_set.and_then(|ws| ws.value(&self.name, id, column)) {
            return Ok(value.clone());
        }
        if self.classifier.is_individual_at(index) {
            self.load_field(coordinator, id, column)
        } else {
            let page = self.row_page(coordinator, id)?;
            page_value(&page, id, column)
        }
    }

    fn load_field(&self, coordinator: &CacheCoordinator, id: i64, column: &str) -> Result<Value> {
        let request = self.field_request(id, column);
        let key = request.key.canonical();
        let mut batch = BatchRequest::new();
        batch.add_field(request);

        let response = coordinator.load_batch(&batch)?;
        response
            .field(&key)
            .map(|f| f.value().clone())
            .ok_or_else(|| Error::protocol(format!("no value delivered for {}", key)))
    }

    fn fetch_page(&self, coordinator: &CacheCoordinator, first: i64) -> Result<Arc<PageCacheEntry>> {
        let request = self.page_request(first);
        let key = request.key.canonical();
        let mut batch = BatchRequest::new();
        batch.add_page(request);

        let response = coordinator.load_batch(&batch)?;
        response
            .page(&key)
            .cloned()
            .ok_or_else(|| Error::protocol(format!("no page delivered for {}", key)))
    }

    fn row_page(&self, coordinator: &CacheCoordinator, id: i64) -> Result<Arc<PageCacheEntry>> {
        let first = first_page_id(id);
        let page = self.fetch_page(coordinator, first)?;
        if page.contains(id) {
            return Ok(page);
        }

        warn!(table = %self.name, id, first_id = first, "row missing from cached page, reloading");
        coordinator.metrics().forced_reloads.inc();
        coordinator
            .store()
            .clear(&page_prefix(self.source_hash, &self.name, first));
        coordinator
            .source()
            .clear_pages(&self.name, &self.page_columns, &[first])?;

        let page = self.fetch_page(coordinator, first)?;
        if page.contains(id) {
            Ok(page)
        } else {
            Err(Error::RowNotFound {
                table: self.name.clone(),
                id,
            })
        }
    }
}

impl std::fmt::Debug for TableCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCache")
            .field("name", &self.name)
            .field("page_columns", &self.page_columns)
            .field("page_size", &PAGE_SIZE)
            .finish()
    }
}

fn page_value(page: &PageCacheEntry, id: i64, column: &str) -> Result<Value> {
    page.value(id, column)
        .cloned()
        .ok_or_else(|| Error::internal(format!("page {} lacks {}#{}", page.key().canonical(), column, id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::options::CacheOptions;
    use crate::schema::ColumnKind;
    use crate::source::MemorySource;
    use std::time::Duration;

    fn fixture() -> (Arc<MemorySource>, Arc<CacheCoordinator>) {
        let source = Arc::new(MemorySource::new("memory://people"));
        source.add_table(
            TableStructure::new("Company")
                .unwrap()
                .with_column("Name", ColumnKind::Text)
                .unwrap()
                .with_column("Logo", ColumnKind::Binary)
                .unwrap(),
        );
        source.add_table(
            TableStructure::new("Person")
                .unwrap()
                .with_column("Name", ColumnKind::Text)
                .unwrap()
                .with_column("Age", ColumnKind::Integer)
                .unwrap()
                .with_column("Employer", ColumnKind::Reference("Company".into()))
                .unwrap()
                .with_column("Bio", ColumnKind::LongText)
                .unwrap(),
        );
        for id in 1..=2i64 {
            source
                .upsert_row("Company", vec![id.into(), format!("c{}", id).into(), vec![id as u8].into()])
                .unwrap();
        }
        for id in 1..=150i64 {
            source
                .upsert_row(
                    "Person",
                    vec![
                        id.into(),
                        format!("p{}", id).into(),
                        (20 + id % 50).into(),
                        (id % 3).into(),
                        format!("bio of {}  ", id).into(),
                    ],
                )
                .unwrap();
        }
        let options = CacheOptions {
            repeat_delay: Duration::from_millis(1),
            ..CacheOptions::default()
        };
        let coordinator =
            CacheCoordinator::new(source.clone(), Arc::new(MemoryStore::new(10_000)), options).unwrap();
        (source, coordinator)
    }

    #[test]
    fn test_get_value_page_and_individual() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();

        assert_eq!(people.get_value(7, "Name").unwrap(), Value::from("p7"));
        assert_eq!(people.get_value(7, "Bio").unwrap(), Value::from("bio of 7"));
        assert_eq!(source.load_calls(), 2);

        // Same page, same value: no further calls
        assert_eq!(people.get_value(42, "Age").unwrap(), Value::Int(62));
        assert_eq!(people.get_value(7, "Bio").unwrap(), Value::from("bio of 7"));
        assert_eq!(source.load_calls(), 2);
    }

    #[test]
    fn test_get_value_no_row_and_unknown_column() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();

        assert_eq!(people.get_value(NO_ROW, "Name").unwrap(), Value::Null);
        assert!(matches!(
            people.get_value(1, "Nope"),
            Err(Error::UnknownColumn { .. })
        ));
        assert_eq!(source.load_calls(), 0);
    }

    #[test]
    fn test_extreme_ids_are_rejected() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();

        for id in [i64::MIN, i64::MAX] {
            assert!(matches!(people.get_value(id, "Name"), Err(Error::InvalidRow(_))));
            assert!(matches!(people.get_value(id, "Bio"), Err(Error::InvalidRow(_))));
            assert!(matches!(people.get_values(id, &["Name"]), Err(Error::InvalidRow(_))));
            assert!(matches!(people.get_row_page(id), Err(Error::InvalidRow(_))));
            assert!(matches!(people.clear_id(id), Err(Error::InvalidRow(_))));
        }
        people.add_preload_ids([i64::MIN, i64::MAX]);
        assert!(people.pending_preloads().is_empty());
        assert_eq!(source.load_calls(), 0);
    }

    #[test]
    fn test_individual_value_of_missing_row() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();

        assert!(matches!(
            people.get_value(999, "Bio"),
            Err(Error::RowNotFound { id: 999, .. })
        ));
        assert_eq!(source.load_calls(), 1);
    }

    #[test]
    fn test_dotted_reference() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();

        assert_eq!(people.get_value(4, "Employer.Name").unwrap(), Value::from("c1"));
        assert_eq!(
            people.get_value(5, "Employer.Logo").unwrap(),
            Value::from(vec![2u8])
        );

        // Employer 0 short-circuits without touching Company
        source.reset_counters();
        assert_eq!(people.get_value(3, "Employer.Name").unwrap(), Value::Null);
        assert_eq!(source.load_calls(), 0);

        assert!(matches!(
            people.get_value(4, "Name.Length"),
            Err(Error::NotAReference { .. })
        ));
    }

    #[test]
    fn test_get_values_aligned() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();

        let values = people
            .get_values(10, &["Bio", "Name", "Employer.Name", "Age"])
            .unwrap();
        assert_eq!(
            values,
            vec![
                Value::from("bio of 10"),
                Value::from("p10"),
                Value::from("c1"),
                Value::Int(30),
            ]
        );
        for (column, value) in ["Bio", "Name", "Employer.Name", "Age"].iter().zip(&values) {
            assert_eq!(&people.get_value(10, column).unwrap(), value);
        }
        assert_eq!(people.get_values(NO_ROW, &["Name", "Bio"]).unwrap(), vec![Value::Null, Value::Null]);
        assert!(source.load_calls() <= 4);
    }

    #[test]
    fn test_get_ref_value_and_working_set() {
        let (_source, cache) = fixture();
        let people = cache.table("Person").unwrap();

        assert_eq!(people.get_ref_value("Employer.Name", 2, None).unwrap(), Value::from("c2"));
        assert_eq!(people.get_ref_value("Employer.Name", NO_ROW, None).unwrap(), Value::Null);
        assert!(people.get_ref_value("Employer", 2, None).is_err());

        let draft = RowSet::from_rows(
            vec!["Id".into(), "Name".into()],
            vec![vec![Value::Int(2), "Draft Co".into()]],
        )
        .unwrap();
        let ws = WorkingSet::new().with_rows("Company", draft);
        assert_eq!(
            people.get_ref_value("Employer.Name", 2, Some(&ws)).unwrap(),
            Value::from("Draft Co")
        );
        assert_eq!(
            people.get_value_in(5, "Employer.Name", Some(&ws)).unwrap(),
            Value::from("Draft Co")
        );
        assert_eq!(people.get_value_in(5, "Name", Some(&ws)).unwrap(), Value::from("p5"));
    }

    #[test]
    fn test_missing_row_forces_single_reload() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();
        people.get_value(101, "Name").unwrap();

        // Inserted after the page was cached
        source
            .upsert_row("Person", vec![151i64.into(), "late".into(), 1i64.into(), 1i64.into(), "x".into()])
            .unwrap();
        source.reset_counters();

        assert_eq!(people.get_value(151, "Name").unwrap(), Value::from("late"));
        assert_eq!(source.load_calls(), 1);
        assert_eq!(source.cleared_pages().len(), 1);
        assert_eq!(source.cleared_pages()[0].first_ids, vec![101]);

        source.reset_counters();
        assert!(matches!(
            people.get_value(199, "Name"),
            Err(Error::RowNotFound { id: 199, .. })
        ));
        assert_eq!(source.load_calls(), 1);
        assert_eq!(cache.metrics().forced_reloads.get(), 2);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();
        people.get_value(1, "Name").unwrap();
        people.get_value(1, "Bio").unwrap();

        people.clear().unwrap();
        people.clear().unwrap();
        source.reset_counters();

        people.get_value(1, "Name").unwrap();
        people.get_value(1, "Bio").unwrap();
        assert_eq!(source.load_calls(), 2);
    }

    #[test]
    fn test_clear_ids_forwards_pages() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();
        people.get_value(1, "Name").unwrap();
        people.get_value(101, "Name").unwrap();

        people.clear_ids(&[5, 50, NO_ROW]).unwrap();
        people.clear_ids(&[]).unwrap();
        let cleared = source.cleared_pages();
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].first_ids, vec![1]);
        assert_eq!(cleared[0].columns, people.page_columns());

        source.reset_counters();
        people.get_value(101, "Name").unwrap();
        assert_eq!(source.load_calls(), 0);
        people.get_value(1, "Name").unwrap();
        assert_eq!(source.load_calls(), 1);
    }

    #[test]
    fn test_update_rows_patches_cached_entries() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();
        people.get_value(3, "Name").unwrap();
        people.get_value(3, "Bio").unwrap();
        source.reset_counters();

        let fresh = RowSet::from_rows(
            vec!["Id".into(), "Name".into(), "Bio".into()],
            vec![
                vec![Value::Int(3), "Three".into(), "new bio ".into()],
                vec![Value::Int(120), "uncached".into(), "x".into()],
            ],
        )
        .unwrap();
        assert_eq!(people.update_rows(&fresh).unwrap(), 1);

        assert_eq!(people.get_value(3, "Name").unwrap(), Value::from("Three"));
        assert_eq!(people.get_value(3, "Bio").unwrap(), Value::from("new bio"));
        assert_eq!(people.get_value(3, "Age").unwrap(), Value::Int(23));
        assert_eq!(source.load_calls(), 0);

        // Page 101 was never cached, so it loads from the source
        assert_eq!(people.get_value(120, "Name").unwrap(), Value::from("p120"));
        assert_eq!(source.load_calls(), 1);
    }

    #[test]
    fn test_update_rows_rejects_unknown_column() {
        let (_source, cache) = fixture();
        let people = cache.table("Person").unwrap();
        let fresh = RowSet::from_rows(vec!["Id".into(), "Nope".into()], vec![vec![Value::Int(1), Value::Null]]).unwrap();
        assert!(matches!(
            people.update_rows(&fresh),
            Err(Error::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_get_page_projection() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();

        let full = people.get_page(50, None).unwrap();
        assert_eq!(full.first_id(), 1);
        let columns = vec!["Age".to_string()];
        let projected = people.get_page(1, Some(&columns)).unwrap();
        assert_eq!(projected.columns(), &["Id".to_string(), "Age".to_string()][..]);
        assert_ne!(projected.key().columns_hash, full.key().columns_hash);
        assert_eq!(projected.value(2, "Age"), Some(&Value::Int(22)));
        assert_eq!(source.load_calls(), 1);

        let bio = vec!["Bio".to_string()];
        assert!(people.get_page(1, Some(&bio)).is_err());
    }

    #[test]
    fn test_create_projection() {
        let (_source, cache) = fixture();
        let people = cache.table("Person").unwrap();

        let rows = people
            .create_projection(&[2, 120, 2, NO_ROW], &["Name", "Employer.Name"])
            .unwrap();
        assert_eq!(rows.columns(), &["Id".to_string(), "Name".into(), "Employer.Name".into()][..]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.value(120, "Name"), Some(&Value::from("p120")));
        assert_eq!(rows.value(2, "Employer.Name"), Some(&Value::from("c2")));
        assert_eq!(rows.value(NO_ROW, "Name"), Some(&Value::Null));
    }

    #[test]
    fn test_projection_fetches_pages_together() {
        let (source, cache) = fixture();
        let people = cache.table("Person").unwrap();

        people.create_projection(&[1, 101], &["Name"]).unwrap();
        assert_eq!(source.load_calls(), 1);
        assert_eq!(source.last_request().unwrap().len(), 2);
        assert!(people.pending_preloads().is_empty());
    }

    #[test]
    fn test_preload_hints() {
        let (_source, cache) = fixture();
        let people = cache.table("Person").unwrap();
        people.add_preload_ids([5, 99, 150, NO_ROW]);
        people.add_preload_id(101);
        assert_eq!(people.pending_preloads(), vec![1, 101]);
        assert_eq!(people.take_preload_ids(), vec![1, 101]);
        assert!(people.pending_preloads().is_empty());
    }
}
