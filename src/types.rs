//! Core types for rowcache.

use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of rows covered by one cached page.
pub const PAGE_SIZE: i64 = 100;

/// Name of the row id column every table carries.
pub const ID_COLUMN: &str = "Id";

/// Row id reserved for "no row".
pub const NO_ROW: i64 = 0;

/// First row id of the page owning `id`.
///
/// Pages cover `[first, first + PAGE_SIZE - 1]`, starting at 1. Ids whose
/// page does not fit in `i64` saturate; [`check_row_id`] rejects them.
pub fn first_page_id(id: i64) -> i64 {
    let page = id.saturating_sub(1).div_euclid(PAGE_SIZE);
    page.saturating_mul(PAGE_SIZE).saturating_add(1)
}

/// First row id of the page owning `id`, or `None` when that page is not
/// representable.
pub fn checked_first_page_id(id: i64) -> Option<i64> {
    let first = id
        .checked_sub(1)?
        .div_euclid(PAGE_SIZE)
        .checked_mul(PAGE_SIZE)?
        .checked_add(1)?;
    first.checked_add(PAGE_SIZE - 1).map(|_| first)
}

/// Reject row ids whose page cannot be addressed.
pub fn check_row_id(id: i64) -> Result<()> {
    match checked_first_page_id(id) {
        Some(_) => Ok(()),
        None => Err(Error::InvalidRow(format!("row id {} is outside the pageable range", id))),
    }
}

/// Row ids covered by the page starting at `first_id`.
pub fn page_range(first_id: i64) -> RangeInclusive<i64> {
    first_id..=first_id.saturating_add(PAGE_SIZE - 1)
}

/// A single scalar column value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL, also returned for the "no row" id.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer, including row ids and references.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Text of any length.
    Text(String),
    /// Binary payload.
    Binary(Bytes),
}

impl Value {
    /// Check if this is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interpret this value as a row id held in a reference column.
    ///
    /// NULL is the same as the "no row" id.
    pub fn reference_id(&self) -> Option<i64> {
        match self {
            Value::Null => Some(NO_ROW),
            Value::Int(id) => Some(*id),
            _ => None,
        }
    }

    /// Get the integer payload.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the binary payload.
    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Strip trailing whitespace from text; other values are returned as is.
    pub fn trimmed(self) -> Self {
        match self {
            Value::Text(mut s) => {
                let len = s.trim_end().len();
                s.truncate(len);
                Value::Text(s)
            }
            other => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Binary(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(Bytes::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Serialized shape of a RowSet.
#[derive(Serialize, Deserialize)]
struct RowSetData {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Tabular result keyed by row id.
///
/// Always contains the id column. Pushing a row whose id is already
/// present replaces the earlier row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RowSetData", into = "RowSetData")]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    /// Position of the id column.
    id_column: usize,
    /// Map from row id to row position.
    by_id: HashMap<i64, usize>,
}

impl RowSet {
    /// Create an empty row set with the given columns.
    pub fn new(columns: Vec<String>) -> Result<Self> {
        let id_column = columns
            .iter()
            .position(|c| c == ID_COLUMN)
            .ok_or_else(|| Error::InvalidRow(format!("missing '{}' column", ID_COLUMN)))?;

        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(Error::InvalidRow(format!("duplicate column '{}'", name)));
            }
        }

        Ok(Self {
            columns,
            rows: Vec::new(),
            id_column,
            by_id: HashMap::new(),
        })
    }

    /// Build a row set from columns and rows.
    pub fn from_rows<I>(columns: Vec<String>, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let mut set = Self::new(columns)?;
        for row in rows {
            set.push(row)?;
        }
        Ok(set)
    }

    /// Append or replace a row.
    pub fn push(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::InvalidRow(format!(
                "expected {} values, got {}",
                self.columns.len(),
                row.len()
            )));
        }

        let id = row[self.id_column]
            .as_int()
            .ok_or_else(|| Error::InvalidRow(format!("row id must be an integer: {}", row[self.id_column])))?;

        match self.by_id.get(&id) {
            Some(&pos) => self.rows[pos] = row,
            None => {
                self.by_id.insert(id, self.rows.len());
                self.rows.push(row);
            }
        }
        Ok(())
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Position of the id column.
    pub fn id_column(&self) -> usize {
        self.id_column
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check if a row with this id is present.
    pub fn contains(&self, id: i64) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Get a row by id.
    pub fn row(&self, id: i64) -> Option<&[Value]> {
        self.by_id.get(&id).map(|&pos| self.rows[pos].as_slice())
    }

    /// Get a single value by row id and column name.
    pub fn value(&self, id: i64, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.row(id).map(|row| &row[col])
    }

    /// Iterate rows in insertion order.
    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    /// Iterate row ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        let id_column = self.id_column;
        self.rows.iter().filter_map(move |r| r[id_column].as_int())
    }

    /// Overwrite one value of an existing row.
    ///
    /// Returns false if the row is absent.
    pub fn set_value(&mut self, id: i64, column: usize, value: Value) -> bool {
        if column == self.id_column || column >= self.columns.len() {
            return false;
        }
        match self.by_id.get(&id) {
            Some(&pos) => {
                self.rows[pos][column] = value;
                true
            }
            None => false,
        }
    }

    /// Copy of this row set restricted to `columns`.
    ///
    /// The id column is always kept, in front if not requested explicitly.
    pub fn project(&self, columns: &[String]) -> Result<RowSet> {
        let mut names: Vec<String> = Vec::with_capacity(columns.len() + 1);
        if !columns.iter().any(|c| c == ID_COLUMN) {
            names.push(ID_COLUMN.to_string());
        }
        names.extend(columns.iter().cloned());

        let positions = names
            .iter()
            .map(|n| {
                self.column_index(n)
                    .ok_or_else(|| Error::InvalidRow(format!("no column '{}' to project", n)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut projected = RowSet::new(names)?;
        for row in &self.rows {
            projected.push(positions.iter().map(|&p| row[p].clone()).collect())?;
        }
        Ok(projected)
    }

    /// Copy of this row set keeping only rows whose id satisfies `keep`.
    pub fn filter_ids<F>(&self, keep: F) -> RowSet
    where
        F: Fn(i64) -> bool,
    {
        let mut filtered = RowSet {
            columns: self.columns.clone(),
            rows: Vec::new(),
            id_column: self.id_column,
            by_id: HashMap::new(),
        };
        for row in &self.rows {
            if let Some(id) = row[self.id_column].as_int() {
                if keep(id) {
                    filtered.by_id.insert(id, filtered.rows.len());
                    filtered.rows.push(row.clone());
                }
            }
        }
        filtered
    }
}

impl TryFrom<RowSetData> for RowSet {
    type Error = Error;

    fn try_from(data: RowSetData) -> Result<Self> {
        RowSet::from_rows(data.columns, data.rows)
    }
}

impl From<RowSet> for RowSetData {
    fn from(set: RowSet) -> Self {
        RowSetData {
            columns: set.columns,
            rows: set.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_page_id_boundaries() {
        assert_eq!(first_page_id(1), 1);
        assert_eq!(first_page_id(100), 1);
        assert_eq!(first_page_id(101), 101);
        assert_eq!(first_page_id(200), 101);
        assert_eq!(first_page_id(201), 201);
    }

    #[test]
    fn test_page_math_at_i64_limits() {
        assert_eq!(checked_first_page_id(i64::MIN), None);
        assert_eq!(checked_first_page_id(i64::MAX), None);
        assert_eq!(checked_first_page_id(-5), Some(-99));
        assert!(check_row_id(i64::MAX).is_err());
        assert!(check_row_id(i64::MIN).is_err());
        assert!(check_row_id(1).is_ok());

        // Saturating forms never panic
        let first = first_page_id(i64::MAX);
        assert_eq!(*page_range(first).end(), i64::MAX);
        let _ = page_range(first_page_id(i64::MIN));
    }

    #[test]
    fn test_page_range() {
        assert_eq!(page_range(101), 101..=200);
        assert!(page_range(1).contains(&100));
        assert!(!page_range(1).contains(&101));
    }

    #[test]
    fn test_value_trimmed() {
        assert_eq!(Value::from("abc  \t\n").trimmed(), Value::from("abc"));
        assert_eq!(Value::from("  lead").trimmed(), Value::from("  lead"));
        assert_eq!(Value::Int(5).trimmed(), Value::Int(5));
    }

    #[test]
    fn test_value_reference_id() {
        assert_eq!(Value::Null.reference_id(), Some(0));
        assert_eq!(Value::Int(12).reference_id(), Some(12));
        assert_eq!(Value::from("x").reference_id(), None);
    }

    #[test]
    fn test_rowset_requires_id_column() {
        assert!(RowSet::new(columns(&["Name"])).is_err());
        assert!(RowSet::new(columns(&["Id", "Name", "Name"])).is_err());
        assert!(RowSet::new(columns(&["Name", "Id"])).is_ok());
    }

    #[test]
    fn test_rowset_push_and_lookup() {
        let mut set = RowSet::new(columns(&["Id", "Name"])).unwrap();
        set.push(vec![Value::Int(1), "Ann".into()]).unwrap();
        set.push(vec![Value::Int(2), "Bob".into()]).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.value(2, "Name"), Some(&Value::from("Bob")));
        assert_eq!(set.value(3, "Name"), None);
        assert_eq!(set.value(1, "Missing"), None);

        // Same id replaces
        set.push(vec![Value::Int(1), "Anna".into()]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.value(1, "Name"), Some(&Value::from("Anna")));

        assert!(set.push(vec![Value::Int(3)]).is_err());
        assert!(set.push(vec![Value::Null, "x".into()]).is_err());
    }

    #[test]
    fn test_rowset_project() {
        let set = RowSet::from_rows(
            columns(&["Id", "Name", "Age"]),
            vec![
                vec![Value::Int(1), "Ann".into(), Value::Int(30)],
                vec![Value::Int(2), "Bob".into(), Value::Int(40)],
            ],
        )
        .unwrap();

        let projected = set.project(&columns(&["Age"])).unwrap();
        assert_eq!(projected.columns(), &columns(&["Id", "Age"])[..]);
        assert_eq!(projected.value(2, "Age"), Some(&Value::Int(40)));
        assert!(projected.value(2, "Name").is_none());

        assert!(set.project(&columns(&["Nope"])).is_err());
    }

    #[test]
    fn test_rowset_set_value_and_filter() {
        let mut set = RowSet::from_rows(
            columns(&["Id", "Name"]),
            (1..=5).map(|i| vec![Value::Int(i), Value::from(format!("n{}", i))]),
        )
        .unwrap();

        assert!(set.set_value(3, 1, "changed".into()));
        assert!(!set.set_value(9, 1, "x".into()));
        assert!(!set.set_value(3, 0, Value::Int(99)));
        assert_eq!(set.value(3, "Name"), Some(&Value::from("changed")));

        let filtered = set.filter_ids(|id| id % 2 == 1);
        assert_eq!(filtered.ids().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(filtered.value(3, "Name"), Some(&Value::from("changed")));
    }
}
