//! In-process data source over in-memory tables.
//!
//! Besides embedded use it records what the cache asks of it: call counts,
//! requests, upstream page clears, and can be told to fail or to leave
//! entries out of its responses.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::batch::{BatchRequest, BatchResponse, FieldRequest, Lookup, PageRequest};
use crate::schema::{ColumnClassifier, TableStructure};
use crate::types::{page_range, RowSet, Value};
use crate::{Error, Result};

use super::DataSource;

/// One recorded `clear_pages` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearedPages {
    pub table: String,
    pub columns: Vec<String>,
    pub first_ids: Vec<i64>,
}

struct MemoryTable {
    structure: TableStructure,
    classification: Option<ColumnClassifier>,
    rows: BTreeMap<i64, Vec<Value>>,
}

impl MemoryTable {
    fn column(&self, name: &str) -> Result<usize> {
        self.structure
            .column_index(name)
            .ok_or_else(|| Error::unknown_column(self.structure.name(), name))
    }
}

/// Failure injection state.
#[derive(Default)]
struct Failures {
    /// Number of upcoming calls that fail.
    next: usize,
    /// Fail every call.
    always: bool,
    /// Canonical keys left out of responses.
    omitted: HashSet<String>,
    /// Tables whose lookups fail every call.
    tables: HashSet<String>,
}

/// Data source holding its tables in memory.
pub struct MemorySource {
    identity: String,
    tables: RwLock<HashMap<String, MemoryTable>>,
    load_calls: AtomicUsize,
    requests: Mutex<Vec<BatchRequest>>,
    cleared: Mutex<Vec<ClearedPages>>,
    failures: Mutex<Failures>,
    per_table: AtomicBool,
}

impl MemorySource {
    /// Create an empty source with the given identity.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            tables: RwLock::new(HashMap::new()),
            load_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
            failures: Mutex::new(Failures::default()),
            per_table: AtomicBool::new(false),
        }
    }

    /// Register a table, replacing any table of the same name.
    pub fn add_table(&self, structure: TableStructure) {
        let name = structure.name().to_string();
        self.tables.write().insert(
            name,
            MemoryTable {
                structure,
                classification: None,
                rows: BTreeMap::new(),
            },
        );
    }

    /// Attach an explicit column classification to a table.
    pub fn set_classification(&self, table: &str, classifier: ColumnClassifier) -> Result<()> {
        let mut tables = self.tables.write();
        let entry = tables.get_mut(table).ok_or_else(|| unknown_table(table))?;
        entry.classification = Some(classifier);
        Ok(())
    }

    /// Insert or replace a row; values follow the table's column order.
    pub fn upsert_row(&self, table: &str, row: Vec<Value>) -> Result<()> {
        let mut tables = self.tables.write();
        let entry = tables.get_mut(table).ok_or_else(|| unknown_table(table))?;
        if row.len() != entry.structure.len() {
            return Err(Error::InvalidRow(format!(
                "'{}' expects {} values, got {}",
                table,
                entry.structure.len(),
                row.len()
            )));
        }
        let id = row[0]
            .as_int()
            .ok_or_else(|| Error::InvalidRow(format!("row id must be an integer: {}", row[0])))?;
        entry.rows.insert(id, row);
        Ok(())
    }

    /// Update one value of an existing row.
    pub fn set_value(&self, table: &str, id: i64, column: &str, value: impl Into<Value>) -> Result<()> {
        let mut tables = self.tables.write();
        let entry = tables.get_mut(table).ok_or_else(|| unknown_table(table))?;
        let index = entry.column(column)?;
        let row = entry.rows.get_mut(&id).ok_or_else(|| Error::RowNotFound {
            table: table.to_string(),
            id,
        })?;
        row[index] = value.into();
        Ok(())
    }

    /// Delete a row; returns whether it existed.
    pub fn delete_row(&self, table: &str, id: i64) -> bool {
        self.tables
            .write()
            .get_mut(table)
            .map(|t| t.rows.remove(&id).is_some())
            .unwrap_or(false)
    }

    /// Ask the cache for one round trip per table.
    pub fn set_per_table_batches(&self, enabled: bool) {
        self.per_table.store(enabled, Ordering::Relaxed);
    }

    /// Fail the next `n` `load_batch` calls with a transient error.
    pub fn fail_next(&self, n: usize) {
        self.failures.lock().next = n;
    }

    /// Fail every `load_batch` call while `enabled`.
    pub fn fail_always(&self, enabled: bool) {
        self.failures.lock().always = enabled;
    }

    /// Fail every `load_batch` call that touches `table`.
    pub fn fail_table(&self, table: impl Into<String>) {
        self.failures.lock().tables.insert(table.into());
    }

    /// Leave the lookup with this canonical key out of every response.
    pub fn omit_key(&self, key: impl Into<String>) {
        self.failures.lock().omitted.insert(key.into());
    }

    /// Number of `load_batch` calls so far.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<BatchRequest> {
        self.requests.lock().clone()
    }

    /// Most recent request.
    pub fn last_request(&self) -> Option<BatchRequest> {
        self.requests.lock().last().cloned()
    }

    /// `clear_pages` calls so far, oldest first.
    pub fn cleared_pages(&self) -> Vec<ClearedPages> {
        self.cleared.lock().clone()
    }

    /// Forget recorded calls and requests.
    pub fn reset_counters(&self) {
        self.load_calls.store(0, Ordering::SeqCst);
        self.requests.lock().clear();
        self.cleared.lock().clear();
    }

    fn load_page(table: &MemoryTable, request: &PageRequest) -> Result<RowSet> {
        let positions = request
            .columns
            .iter()
            .map(|c| table.column(c))
            .collect::<Result<Vec<_>>>()?;

        let mut rows = RowSet::new(request.columns.clone())?;
        for row in table.rows.range(page_range(request.first_id())).map(|(_, row)| row) {
            rows.push(positions.iter().map(|&p| row[p].clone()).collect())?;
        }
        Ok(rows)
    }

    fn load_field(table: &MemoryTable, request: &FieldRequest) -> Result<Value> {
        let index = table.column(&request.key.column)?;
        table
            .rows
            .get(&request.key.id)
            .map(|row| row[index].clone())
            .ok_or_else(|| Error::RowNotFound {
                table: request.key.table.clone(),
                id: request.key.id,
            })
    }
}

fn unknown_table(table: &str) -> Error {
    Error::InvalidConfiguration(format!("unknown table '{}'", table))
}

impl DataSource for MemorySource {
    fn data_source_identity(&self) -> String {
        self.identity.clone()
    }

    fn table_structure(&self, table: &str) -> Result<TableStructure> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.structure.clone())
            .ok_or_else(|| unknown_table(table))
    }

    fn column_classification(&self, table: &str) -> Result<Option<ColumnClassifier>> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.classification.clone())
            .ok_or_else(|| unknown_table(table))
    }

    fn load_batch(&self, request: &BatchRequest) -> Result<BatchResponse> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let omitted = {
            let mut failures = self.failures.lock();
            if failures.always {
                return Err(Error::transient("injected failure"));
            }
            if failures.next > 0 {
                failures.next -= 1;
                return Err(Error::transient("injected failure"));
            }
            if let Some(table) = request.tables().into_iter().find(|t| failures.tables.contains(*t)) {
                return Err(Error::transient(format!("injected failure for '{}'", table)));
            }
            failures.omitted.clone()
        };

        let tables = self.tables.read();
        let mut response = BatchResponse::new();
        for lookup in request.iter() {
            if omitted.contains(&lookup.canonical()) {
                continue;
            }
            let table = tables.get(lookup.table()).ok_or_else(|| unknown_table(lookup.table()))?;
            match lookup {
                Lookup::Page(page) => {
                    let rows = Self::load_page(table, page)?;
                    response.insert_page(page, rows)?;
                }
                Lookup::Field(field) => {
                    let value = Self::load_field(table, field)?;
                    response.insert_field(field, value);
                }
            }
        }
        Ok(response)
    }

    fn clear_pages(&self, table: &str, columns: &[String], first_ids: &[i64]) -> Result<()> {
        self.cleared.lock().push(ClearedPages {
            table: table.to_string(),
            columns: columns.to_vec(),
            first_ids: first_ids.to_vec(),
        });
        Ok(())
    }

    fn prefers_per_table_batches(&self) -> bool {
        self.per_table.load(Ordering::Relaxed)
    }
}
