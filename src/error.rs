//! Error types for rowcache.

use thiserror::Error;

use crate::batch::BatchRequest;

/// Result type alias for rowcache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Column does not exist on the table.
    #[error("Unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// Dotted path head does not name a reference column.
    #[error("Column '{column}' on table '{table}' is not a reference column")]
    NotAReference { table: String, column: String },

    /// Zero-length table name.
    #[error("Table name must not be empty")]
    EmptyTableName,

    /// Mutation attempted on a frozen object.
    #[error("Object is read-only: {0}")]
    ReadOnly(String),

    /// Called from a thread other than the owner in single-thread mode.
    #[error("Cache accessed from a thread other than the one that created it")]
    WrongThread,

    /// Column classification and table structure disagree.
    #[error("Column classification for '{table}' has {actual} columns, structure has {expected}")]
    ClassificationMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// Column added twice to a structure.
    #[error("Duplicate column '{column}' on table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// Malformed row data.
    #[error("Invalid row data: {0}")]
    InvalidRow(String),

    /// Transient failure reported by the data source.
    #[error("Data source error: {0}")]
    Source(String),

    /// Retries exhausted while loading from the data source.
    #[error("Load failed after {attempts} attempts ({} lookups unresolved): {last}", .request.len())]
    LoadFailed {
        request: Box<BatchRequest>,
        attempts: usize,
        #[source]
        last: Box<Error>,
    },

    /// The data source broke its contract.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Row does not exist in the data source.
    #[error("Row {id} not found in table '{table}'")]
    RowNotFound { table: String, id: i64 },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an unknown column error.
    pub fn unknown_column<T: Into<String>, C: Into<String>>(table: T, column: C) -> Self {
        Error::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create a read-only error.
    pub fn read_only<S: Into<String>>(what: S) -> Self {
        Error::ReadOnly(what.into())
    }

    /// Create a transient data source error.
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        Error::Source(msg.into())
    }

    /// Create a protocol violation error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::ProtocolViolation(msg.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Check if this error may go away when the operation is repeated.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Source(_))
    }

    /// Check if this error stems from a programming or configuration mistake.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownColumn { .. }
                | Error::NotAReference { .. }
                | Error::EmptyTableName
                | Error::ReadOnly(_)
                | Error::WrongThread
                | Error::DuplicateColumn { .. }
                | Error::InvalidConfiguration(_)
        )
    }

    /// The request left unresolved by a failed load, if any.
    pub fn unresolved_request(&self) -> Option<&BatchRequest> {
        match self {
            Error::LoadFailed { request, .. } => Some(request.as_ref()),
            _ => None,
        }
    }

    /// Point a load failure at `request`. Other errors pass through.
    pub(crate) fn for_request(self, request: &BatchRequest) -> Self {
        match self {
            Error::LoadFailed { attempts, last, .. } => Error::LoadFailed {
                request: Box::new(request.clone()),
                attempts,
                last,
            },
            other => other,
        }
    }
}
