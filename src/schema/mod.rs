//! Table structure and per-column cache classification.
//!
//! - **TableStructure**: column names and storage kinds of one table
//! - **ColumnClassifier**: decides whether a column is cached with its row
//!   page or individually

mod classifier;
mod structure;

pub use classifier::{ColumnClassifier, ColumnRef};
pub use structure::{ColumnDef, ColumnKind, TableStructure};
