//! Table structure descriptions.

use serde::{Deserialize, Serialize};

use crate::types::ID_COLUMN;
use crate::{Error, Result};

/// Storage kind of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Row id column.
    Id,
    /// Integer.
    Integer,
    /// Floating point.
    Float,
    /// Boolean.
    Boolean,
    /// Short text.
    Text,
    /// Date/time stored as text or integer by the source.
    DateTime,
    /// Unbounded text.
    LongText,
    /// XML/JSON-like structured text.
    StructuredText,
    /// Binary blob.
    Binary,
    /// Id of a row in another table.
    Reference(String),
}

impl ColumnKind {
    /// Check if this kind holds a large, variable-length payload.
    pub fn is_large_payload(&self) -> bool {
        matches!(
            self,
            ColumnKind::LongText | ColumnKind::StructuredText | ColumnKind::Binary
        )
    }

    /// Check if values of this kind are whitespace-trimmed text.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ColumnKind::Text | ColumnKind::LongText | ColumnKind::StructuredText
        )
    }

    /// Referenced table name for reference columns.
    pub fn reference_target(&self) -> Option<&str> {
        match self {
            ColumnKind::Reference(table) => Some(table),
            _ => None,
        }
    }
}

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Storage kind.
    pub kind: ColumnKind,
}

impl ColumnDef {
    /// Create a column definition.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Column layout of one table.
///
/// The id column is always present at position 0. Once frozen the
/// structure rejects further changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStructure {
    name: String,
    columns: Vec<ColumnDef>,
    #[serde(default)]
    frozen: bool,
}

impl TableStructure {
    /// Create a structure holding only the id column.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyTableName);
        }
        Ok(Self {
            name,
            columns: vec![ColumnDef::new(ID_COLUMN, ColumnKind::Id)],
            frozen: false,
        })
    }

    /// Add a column.
    pub fn add_column(&mut self, name: impl Into<String>, kind: ColumnKind) -> Result<()> {
        if self.frozen {
            return Err(Error::read_only(format!("structure of '{}'", self.name)));
        }
        let name = name.into();
        if self.column_index(&name).is_some() {
            return Err(Error::DuplicateColumn {
                table: self.name.clone(),
                column: name,
            });
        }
        self.columns.push(ColumnDef::new(name, kind));
        Ok(())
    }

    /// Builder-style variant of `add_column`.
    pub fn with_column(mut self, name: impl Into<String>, kind: ColumnKind) -> Result<Self> {
        self.add_column(name, kind)?;
        Ok(self)
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All columns in order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Column at position `index`.
    pub fn column(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column definition by name.
    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Number of columns, including the id column.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false; the id column is always present.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Make the structure read-only. Idempotent.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Check if the structure is read-only.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}
