//! Column classification: page-cached versus individually cached.
//!
//! Large payload columns (long text, structured text, binary) are cached
//! one value at a time by default; everything else travels with its page.
//! Explicit overrides live in a sparse map so the common case of no
//! overrides costs nothing beyond the structure itself.

use std::collections::HashMap;

use crate::types::ID_COLUMN;
use crate::{Error, Result};

use super::structure::{ColumnKind, TableStructure};

/// Column addressed by position or by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRef<'a> {
    /// Column position in the structure.
    Index(usize),
    /// Column name.
    Name(&'a str),
}

impl From<usize> for ColumnRef<'_> {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl<'a> From<&'a str> for ColumnRef<'a> {
    fn from(name: &'a str) -> Self {
        ColumnRef::Name(name)
    }
}

impl<'a> From<&'a String> for ColumnRef<'a> {
    fn from(name: &'a String) -> Self {
        ColumnRef::Name(name.as_str())
    }
}

/// Per-table cache descriptor.
///
/// Mutable while being configured; `freeze` makes it (and its bound
/// structure) read-only before it is shared.
#[derive(Debug, Clone)]
pub struct ColumnClassifier {
    structure: TableStructure,
    /// Explicit flags by column position.
    overrides: HashMap<usize, bool>,
    frozen: bool,
}

impl ColumnClassifier {
    /// Create a classifier bound to `structure` with default flags.
    pub fn new(structure: TableStructure) -> Self {
        Self {
            structure,
            overrides: HashMap::new(),
            frozen: false,
        }
    }

    /// Default flag for a storage kind.
    pub fn default_for(kind: &ColumnKind) -> bool {
        kind.is_large_payload()
    }

    /// Check if a column is cached individually.
    pub fn is_individual<'a>(&self, column: impl Into<ColumnRef<'a>>) -> Result<bool> {
        let index = self.resolve(column.into())?;
        Ok(self.is_individual_at(index))
    }

    /// Check if the column at `index` is cached individually.
    ///
    /// Out-of-range positions report false.
    pub fn is_individual_at(&self, index: usize) -> bool {
        if let Some(&flag) = self.overrides.get(&index) {
            return flag;
        }
        self.structure
            .column(index)
            .map(|c| Self::default_for(&c.kind))
            .unwrap_or(false)
    }

    /// Override the flag of one column.
    pub fn set_individual<'a>(&mut self, column: impl Into<ColumnRef<'a>>, individual: bool) -> Result<()> {
        if self.frozen {
            return Err(Error::read_only(format!(
                "column classification of '{}'",
                self.structure.name()
            )));
        }
        let index = self.resolve(column.into())?;
        if index == 0 && individual {
            return Err(Error::InvalidConfiguration(format!(
                "'{}' column cannot be cached individually",
                ID_COLUMN
            )));
        }
        self.overrides.insert(index, individual);
        Ok(())
    }

    /// Rebind to another structure with the same column count.
    pub fn bind(&mut self, structure: TableStructure) -> Result<()> {
        if self.frozen {
            return Err(Error::read_only(format!(
                "column classification of '{}'",
                self.structure.name()
            )));
        }
        if structure.len() != self.structure.len() {
            return Err(Error::ClassificationMismatch {
                table: structure.name().to_string(),
                expected: structure.len(),
                actual: self.structure.len(),
            });
        }
        self.structure = structure;
        Ok(())
    }

    /// Make the classifier and its structure read-only. Idempotent.
    pub fn freeze(&mut self) {
        self.structure.freeze();
        self.frozen = true;
    }

    /// Check if the classifier is read-only.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The bound structure.
    pub fn structure(&self) -> &TableStructure {
        &self.structure
    }

    /// Number of classified columns.
    pub fn column_count(&self) -> usize {
        self.structure.len()
    }

    /// Names of the page-cached columns, id column first.
    pub fn page_columns(&self) -> Vec<String> {
        self.structure
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.is_individual_at(*i))
            .map(|(_, c)| c.name.clone())
            .collect()
    }

    /// Names of the individually cached columns.
    pub fn individual_columns(&self) -> Vec<String> {
        self.structure
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| self.is_individual_at(*i))
            .map(|(_, c)| c.name.clone())
            .collect()
    }

    fn resolve(&self, column: ColumnRef<'_>) -> Result<usize> {
        match column {
            ColumnRef::Index(i) if i < self.structure.len() => Ok(i),
            ColumnRef::Index(i) => Err(Error::unknown_column(self.structure.name(), format!("#{}", i))),
            ColumnRef::Name(name) => self
                .structure
                .column_index(name)
                .ok_or_else(|| Error::unknown_column(self.structure.name(), name)),
        }
    }
}
