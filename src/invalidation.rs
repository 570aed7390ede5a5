//! Invalidation descriptions shipped from the authoritative side.
//!
//! A diff either clears everything, or names tables to clear. A table with
//! no page set (or an empty one) is cleared entirely; otherwise only the
//! listed pages are.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::first_page_id;

/// Pending invalidation of cached pages and values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationDiff {
    #[serde(default)]
    clear_all: bool,
    #[serde(default)]
    tables: BTreeMap<String, Option<BTreeSet<i64>>>,
}

impl InvalidationDiff {
    /// Create an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every cached entry.
    pub fn clear_all(mut self) -> Self {
        self.clear_all = true;
        self
    }

    /// Clear every page of `table`.
    pub fn clear_table(mut self, table: impl Into<String>) -> Self {
        self.tables.insert(table.into(), None);
        self
    }

    /// Clear the pages starting at `first_ids` (normalized to page boundaries).
    pub fn clear_pages(mut self, table: impl Into<String>, first_ids: impl IntoIterator<Item = i64>) -> Self {
        self.add_pages(table.into(), first_ids.into_iter().map(first_page_id));
        self
    }

    /// Clear the pages owning `row_ids`.
    pub fn clear_rows(self, table: impl Into<String>, row_ids: impl IntoIterator<Item = i64>) -> Self {
        self.clear_pages(table, row_ids)
    }

    /// Union with `other`. A whole-table clear absorbs page clears.
    pub fn merge(&mut self, other: &InvalidationDiff) {
        self.clear_all |= other.clear_all;
        for (table, pages) in &other.tables {
            match pages {
                Some(pages) if !pages.is_empty() => self.add_pages(table.clone(), pages.iter().copied()),
                _ => {
                    self.tables.insert(table.clone(), None);
                }
            }
        }
    }

    /// Check if applying the diff would do nothing.
    pub fn is_empty(&self) -> bool {
        !self.clear_all && self.tables.is_empty()
    }

    /// Check if the diff clears everything.
    pub fn clears_all(&self) -> bool {
        self.clear_all
    }

    /// Tables named by the diff with their page sets; `None` means the
    /// whole table.
    pub fn tables(&self) -> impl Iterator<Item = (&str, Option<&BTreeSet<i64>>)> {
        self.tables
            .iter()
            .map(|(table, pages)| (table.as_str(), pages.as_ref().filter(|p| !p.is_empty())))
    }

    fn add_pages(&mut self, table: String, first_ids: impl Iterator<Item = i64>) {
        let entry = self.tables.entry(table).or_insert_with(|| Some(BTreeSet::new()));
        if let Some(pages) = entry {
            pages.extend(first_ids);
        }
    }
}
