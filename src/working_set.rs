//! Primary working set: rows being edited before commit.

use std::collections::HashMap;

use crate::types::{RowSet, Value};

/// Per-table edit buffers consulted ahead of the cache.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    tables: HashMap<String, RowSet>,
}

impl WorkingSet {
    /// Create an empty working set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the edit buffer of a table, replacing any previous one.
    pub fn insert(&mut self, table: impl Into<String>, rows: RowSet) {
        self.tables.insert(table.into(), rows);
    }

    /// Builder-style variant of `insert`.
    pub fn with_rows(mut self, table: impl Into<String>, rows: RowSet) -> Self {
        self.insert(table, rows);
        self
    }

    /// Remove the edit buffer of a table.
    pub fn remove(&mut self, table: &str) -> Option<RowSet> {
        self.tables.remove(table)
    }

    /// Edit buffer of a table.
    pub fn rows(&self, table: &str) -> Option<&RowSet> {
        self.tables.get(table)
    }

    /// Buffered value, if the table holds this row and column.
    pub fn value(&self, table: &str, id: i64, column: &str) -> Option<&Value> {
        self.tables.get(table)?.value(id, column)
    }

    /// Number of buffered tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
