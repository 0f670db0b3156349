//! Error types for SQLite ledger operations.
//!
//! Provides a unified error type covering database access, row conversion,
//! migration, operation state, and validation failures.

use sqlrun_core::{LedgerError, UnknownLabel};
use thiserror::Error;

/// Errors that can occur during SQLite ledger operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// A stored label or value could not be converted to a ledger type.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// Ledger table lifecycle operation failure.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// The parent operation does not exist or has already been finalized.
    #[error("operation {0} is missing or already finalized")]
    OperationNotPending(i64),

    /// Table prefix contains invalid characters.
    #[error("invalid prefix '{0}': must contain only alphanumeric characters and underscores")]
    InvalidPrefix(String),

    /// The store could not produce a valid generated id.
    #[error("no valid id generated for new {0} row")]
    MissingId(&'static str),
}

impl From<UnknownLabel> for SqliteError {
    fn from(err: UnknownLabel) -> Self {
        SqliteError::ConversionError(err.to_string())
    }
}

impl From<SqliteError> for LedgerError {
    fn from(err: SqliteError) -> Self {
        LedgerError(err.to_string())
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
