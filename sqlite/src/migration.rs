//! Lifecycle operations for the ledger tables.
//!
//! Provides [`LedgerMigration`] for creating, dropping, and inspecting the
//! two ledger tables. Mutations run inside a transaction so a partially
//! created ledger is never left behind.
//!
//! # Example
//!
//! ```no_run
//! use rusqlite::Connection;
//! use sqlrun_sqlite::LedgerMigration;
//!
//! let conn = Connection::open("app.db").unwrap();
//! let migration = LedgerMigration::new(&conn, "__sqlrun_").unwrap();
//!
//! migration.up().unwrap();
//! let status = migration.status().unwrap();
//! assert!(status.tables_exist);
//! ```

use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, SqliteError};
use crate::schema::{generate_drop_sql, generate_ledger_sql, validate_prefix};

/// Manages the lifecycle of the ledger tables.
///
/// Borrows the connection so the same handle can be used afterwards for
/// the ledger itself and for executing SQL files.
pub struct LedgerMigration<'a> {
    conn: &'a Connection,
    prefix: String,
}

impl<'a> LedgerMigration<'a> {
    /// Creates a migration manager for the given connection and table prefix.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidPrefix`] if the prefix contains invalid characters.
    pub fn new(conn: &'a Connection, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, prefix })
    }

    /// Creates the ledger tables and indexes.
    ///
    /// Uses `CREATE TABLE IF NOT EXISTS` so it is safe to call on every run.
    pub fn up(&self) -> Result<()> {
        let sql = generate_ledger_sql(&self.prefix)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&sql)
            .map_err(|e| SqliteError::MigrationError(format!("failed to create tables: {e}")))?;
        tx.commit()?;
        info!(prefix = %self.prefix, "ledger tables ready");
        Ok(())
    }

    /// Drops the ledger tables, executions first.
    pub fn down(&self) -> Result<()> {
        let sql = generate_drop_sql(&self.prefix)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&sql)
            .map_err(|e| SqliteError::MigrationError(format!("failed to drop tables: {e}")))?;
        tx.commit()?;
        info!(prefix = %self.prefix, "ledger tables dropped");
        Ok(())
    }

    /// Reports whether the ledger exists and how many rows it holds.
    pub fn status(&self) -> Result<LedgerStatus> {
        if !self.tables_exist()? {
            return Ok(LedgerStatus::default());
        }

        Ok(LedgerStatus {
            tables_exist: true,
            operation_count: self.count_rows("operations")?,
            execution_count: self.count_rows("executions")?,
        })
    }

    fn tables_exist(&self) -> Result<bool> {
        let mut stmt = self.conn.prepare(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN (?1, ?2)",
        )?;
        let count: i64 = stmt.query_row(
            [
                format!("{}operations", self.prefix),
                format!("{}executions", self.prefix),
            ],
            |row| row.get(0),
        )?;
        Ok(count == 2)
    }

    fn count_rows(&self, table: &str) -> Result<usize> {
        let full_table = format!("{}{}", self.prefix, table);
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {full_table}"), [], |row| {
                row.get(0)
            })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Snapshot returned by [`LedgerMigration::status`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStatus {
    /// Whether both ledger tables exist.
    pub tables_exist: bool,
    pub operation_count: usize,
    pub execution_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_prefix() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(LedgerMigration::new(&conn, "valid_prefix_").is_ok());
        assert!(LedgerMigration::new(&conn, "").is_err());
        assert!(LedgerMigration::new(&conn, "drop;--").is_err());
    }

    #[test]
    fn test_status_on_empty_database() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = LedgerMigration::new(&conn, "l_").unwrap();
        assert_eq!(migration.status().unwrap(), LedgerStatus::default());
    }

    #[test]
    fn test_up_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = LedgerMigration::new(&conn, "l_").unwrap();
        migration.up().unwrap();
        migration.up().unwrap();
        let status = migration.status().unwrap();
        assert!(status.tables_exist);
        assert_eq!(status.operation_count, 0);
        assert_eq!(status.execution_count, 0);
    }

    #[test]
    fn test_down_removes_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = LedgerMigration::new(&conn, "l_").unwrap();
        migration.down().unwrap();
        migration.up().unwrap();
        migration.down().unwrap();
        assert!(!migration.status().unwrap().tables_exist);
    }

    #[test]
    fn test_prefixes_are_isolated() {
        let conn = Connection::open_in_memory().unwrap();
        LedgerMigration::new(&conn, "a_").unwrap().up().unwrap();
        let other = LedgerMigration::new(&conn, "b_").unwrap();
        assert!(!other.status().unwrap().tables_exist);
    }
}
