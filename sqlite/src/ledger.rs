//! SQLite implementation of the ledger store.
//!
//! [`SqliteLedger`] borrows the same connection the batch executes SQL
//! against; the caller opens it before the batch and drops it afterwards.
//!
//! # Example
//!
//! ```no_run
//! use rusqlite::Connection;
//! use sqlrun_core::{ChangeType, Direction, LedgerStore, NewOperation};
//! use sqlrun_sqlite::{LedgerMigration, SqliteLedger};
//!
//! let conn = Connection::open("app.db").unwrap();
//! LedgerMigration::new(&conn, "__sqlrun_").unwrap().up().unwrap();
//!
//! let ledger = SqliteLedger::new(&conn, "__sqlrun_").unwrap();
//! let id = ledger
//!     .insert_operation(&NewOperation {
//!         name: "build 2024-01-15T10:30:00".into(),
//!         change_type: ChangeType::Build,
//!         direction: Direction::Commit,
//!         config_name: "dev".into(),
//!         executed_by: "Ada <ada@example.com>".into(),
//!     })
//!     .unwrap();
//! assert!(id > 0);
//! ```

use rusqlite::{Connection, OptionalExtension, params};
use sqlrun_core::{
    ChangeType, ExecutionLookup, ExecutionRecord, ExecutionStatus, ExecutionUpdate, LedgerResult,
    LedgerStore, NewExecution, NewOperation, OperationFinal, OperationQuery, OperationRecord,
    OperationStatus, PlannedFile, SkipReason,
};
use tracing::debug;

use crate::convert::{
    EXECUTION_COLUMNS, OPERATION_COLUMNS, RawExecution, RawOperation, direction_to_label,
    millis_to_sql,
};
use crate::error::{Result, SqliteError};
use crate::schema::validate_prefix;

/// Ledger store backed by two prefixed SQLite tables.
pub struct SqliteLedger<'a> {
    conn: &'a Connection,
    prefix: String,
}

impl<'a> SqliteLedger<'a> {
    /// Creates a ledger over the given connection and table prefix.
    ///
    /// The tables must already exist (see [`LedgerMigration::up`](crate::LedgerMigration::up)).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidPrefix`] if the prefix is invalid.
    pub fn new(conn: &'a Connection, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, prefix })
    }

    /// Returns the table prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn create_operation(&self, op: &NewOperation) -> Result<i64> {
        let sql = format!(
            "INSERT INTO {}operations (name, change_type, direction, status, config_name, executed_by) \
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5) RETURNING id",
            self.prefix
        );
        let returned: Option<i64> = self
            .conn
            .query_row(
                &sql,
                params![
                    op.name,
                    op.change_type.as_str(),
                    direction_to_label(op.direction),
                    op.config_name,
                    op.executed_by,
                ],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();

        let id = match returned {
            Some(id) if id > 0 => id,
            _ => {
                debug!("RETURNING produced no id, falling back to last_insert_rowid");
                self.conn.last_insert_rowid()
            }
        };
        if id <= 0 {
            return Err(SqliteError::MissingId("operation"));
        }
        Ok(id)
    }

    fn finalize(&self, id: i64, outcome: &OperationFinal) -> Result<usize> {
        let sql = format!(
            "UPDATE {}operations \
             SET status = ?2, duration_ms = ?3, checksum = COALESCE(?4, checksum), error_message = ?5 \
             WHERE id = ?1 AND status = 'pending'",
            self.prefix
        );
        let rows = self.conn.execute(
            &sql,
            params![
                id,
                outcome.status.as_str(),
                millis_to_sql(outcome.duration_ms),
                outcome.checksum,
                outcome.error_message,
            ],
        )?;
        Ok(rows)
    }

    fn create_execution(&self, exec: &NewExecution) -> Result<i64> {
        let sql = format!(
            "INSERT INTO {p}executions \
             (change_id, filepath, file_type, checksum, status, skip_reason, error_message, duration_ms) \
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8 \
             WHERE EXISTS (SELECT 1 FROM {p}operations WHERE id = ?1 AND status = 'pending')",
            p = self.prefix
        );
        let rows = self.conn.execute(
            &sql,
            params![
                exec.change_id,
                exec.filepath,
                exec.file_type.as_str(),
                exec.checksum,
                exec.status.as_str(),
                exec.skip_reason.map(SkipReason::as_str),
                exec.error_message,
                exec.duration_ms.map(millis_to_sql),
            ],
        )?;
        if rows == 0 {
            return Err(SqliteError::OperationNotPending(exec.change_id));
        }
        Ok(self.conn.last_insert_rowid())
    }

    fn create_pending(&self, operation_id: i64, files: &[PlannedFile]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let pending: Option<String> = tx
            .query_row(
                &format!("SELECT status FROM {}operations WHERE id = ?1", self.prefix),
                [operation_id],
                |row| row.get(0),
            )
            .optional()?;
        if pending.as_deref() != Some(OperationStatus::Pending.as_str()) {
            return Err(SqliteError::OperationNotPending(operation_id));
        }

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {}executions (change_id, filepath, file_type, checksum, status) \
                 VALUES (?1, ?2, ?3, ?4, 'pending')",
                self.prefix
            ))?;
            for file in files {
                inserted += stmt.execute(params![
                    operation_id,
                    file.filepath,
                    file.file_type.as_str(),
                    file.checksum,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn update_pending(
        &self,
        operation_id: i64,
        filepath: &str,
        update: &ExecutionUpdate,
    ) -> Result<usize> {
        let sql = format!(
            "UPDATE {p}executions \
             SET status = ?3, duration_ms = ?4, error_message = ?5, skip_reason = ?6 \
             WHERE id = ( \
                 SELECT e.id FROM {p}executions e \
                 JOIN {p}operations o ON o.id = e.change_id \
                 WHERE e.change_id = ?1 AND e.filepath = ?2 \
                   AND e.status = 'pending' AND o.status = 'pending' \
                 ORDER BY e.id LIMIT 1)",
            p = self.prefix
        );
        let rows = self.conn.execute(
            &sql,
            params![
                operation_id,
                filepath,
                update.status.as_str(),
                update.duration_ms.map(millis_to_sql),
                update.error_message,
                update.skip_reason.map(SkipReason::as_str),
            ],
        )?;
        Ok(rows)
    }

    fn skip_pending(&self, operation_id: i64, reason: SkipReason) -> Result<usize> {
        let sql = format!(
            "UPDATE {p}executions SET status = ?2, skip_reason = ?3 \
             WHERE change_id = ?1 AND status = 'pending' \
               AND EXISTS (SELECT 1 FROM {p}operations WHERE id = ?1 AND status = 'pending')",
            p = self.prefix
        );
        let rows = self.conn.execute(
            &sql,
            params![operation_id, ExecutionStatus::Skipped.as_str(), reason.as_str()],
        )?;
        Ok(rows)
    }

    fn find_latest_execution(
        &self,
        filepath: &str,
        config_name: &str,
        exclude_operation: Option<i64>,
    ) -> Result<Option<ExecutionLookup>> {
        let sql = format!(
            "SELECT {columns}, o.status FROM {p}executions e \
             JOIN {p}operations o ON o.id = e.change_id \
             WHERE e.filepath = ?1 AND o.config_name = ?2 AND o.change_type != 'change' \
               AND (?3 IS NULL OR e.change_id != ?3) \
               AND NOT (e.status = 'skipped' AND e.skip_reason IN ('unchanged', 'already-run')) \
             ORDER BY e.id DESC LIMIT 1",
            columns = qualified(EXECUTION_COLUMNS, "e"),
            p = self.prefix
        );
        let raw = self
            .conn
            .query_row(&sql, params![filepath, config_name, exclude_operation], |row| {
                Ok((RawExecution::from_row(row, 0)?, row.get::<_, String>(9)?))
            })
            .optional()?;

        raw.map(|(execution, status)| {
            Ok(ExecutionLookup {
                execution: execution.into_record()?,
                operation_status: status.parse()?,
            })
        })
        .transpose()
    }

    fn find_latest_operation(&self, query: &OperationQuery<'_>) -> Result<Option<OperationRecord>> {
        let sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM {}operations \
             WHERE name = ?1 AND config_name = ?2 AND change_type = ?3 AND direction = ?4 \
             ORDER BY id DESC LIMIT 1",
            self.prefix
        );
        let raw = self
            .conn
            .query_row(
                &sql,
                params![
                    query.name,
                    query.config_name,
                    query.change_type.as_str(),
                    direction_to_label(query.direction),
                ],
                |row| RawOperation::from_row(row, 0),
            )
            .optional()?;
        raw.map(RawOperation::into_record).transpose()
    }

    fn list_operations(
        &self,
        config_name: &str,
        change_type: Option<ChangeType>,
    ) -> Result<Vec<OperationRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OPERATION_COLUMNS} FROM {}operations \
             WHERE config_name = ?1 AND (?2 IS NULL OR change_type = ?2) \
             ORDER BY id",
            self.prefix
        ))?;
        let raws = stmt
            .query_map(
                params![config_name, change_type.map(ChangeType::as_str)],
                |row| RawOperation::from_row(row, 0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawOperation::into_record).collect()
    }

    fn list_executions(&self, operation_id: i64) -> Result<Vec<ExecutionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM {}executions WHERE change_id = ?1 ORDER BY id",
            self.prefix
        ))?;
        let raws = stmt
            .query_map([operation_id], |row| RawExecution::from_row(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawExecution::into_record).collect()
    }

    fn stale_all(&self, config_name: &str) -> Result<usize> {
        let rows = self.conn.execute(
            &format!(
                "UPDATE {}operations SET status = 'stale' \
                 WHERE config_name = ?1 AND status IN ('success', 'failed')",
                self.prefix
            ),
            [config_name],
        )?;
        Ok(rows)
    }
}

impl LedgerStore for SqliteLedger<'_> {
    fn insert_operation(&self, op: &NewOperation) -> LedgerResult<i64> {
        Ok(self.create_operation(op)?)
    }

    fn finalize_operation(&self, id: i64, outcome: &OperationFinal) -> LedgerResult<usize> {
        Ok(self.finalize(id, outcome)?)
    }

    fn insert_execution(&self, exec: &NewExecution) -> LedgerResult<i64> {
        Ok(self.create_execution(exec)?)
    }

    fn insert_pending_executions(
        &self,
        operation_id: i64,
        files: &[PlannedFile],
    ) -> LedgerResult<usize> {
        Ok(self.create_pending(operation_id, files)?)
    }

    fn update_pending_execution(
        &self,
        operation_id: i64,
        filepath: &str,
        update: &ExecutionUpdate,
    ) -> LedgerResult<usize> {
        Ok(self.update_pending(operation_id, filepath, update)?)
    }

    fn skip_pending_executions(
        &self,
        operation_id: i64,
        reason: SkipReason,
    ) -> LedgerResult<usize> {
        Ok(self.skip_pending(operation_id, reason)?)
    }

    fn latest_execution(
        &self,
        filepath: &str,
        config_name: &str,
        exclude_operation: Option<i64>,
    ) -> LedgerResult<Option<ExecutionLookup>> {
        Ok(self.find_latest_execution(filepath, config_name, exclude_operation)?)
    }

    fn latest_operation(&self, query: &OperationQuery<'_>) -> LedgerResult<Option<OperationRecord>> {
        Ok(self.find_latest_operation(query)?)
    }

    fn operations(
        &self,
        config_name: &str,
        change_type: Option<ChangeType>,
    ) -> LedgerResult<Vec<OperationRecord>> {
        Ok(self.list_operations(config_name, change_type)?)
    }

    fn executions(&self, operation_id: i64) -> LedgerResult<Vec<ExecutionRecord>> {
        Ok(self.list_executions(operation_id)?)
    }

    fn mark_stale(&self, config_name: &str) -> LedgerResult<usize> {
        Ok(self.stale_all(config_name)?)
    }
}

/// Qualifies each column in a comma-separated list with a table alias.
fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LedgerMigration;
    use sqlrun_core::{Direction, FileType};

    fn ledger_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        LedgerMigration::new(&conn, "l_").unwrap().up().unwrap();
        conn
    }

    fn new_op(name: &str) -> NewOperation {
        NewOperation {
            name: name.to_string(),
            change_type: ChangeType::Build,
            direction: Direction::Commit,
            config_name: "dev".to_string(),
            executed_by: "tester".to_string(),
        }
    }

    fn success() -> OperationFinal {
        OperationFinal {
            status: OperationStatus::Success,
            duration_ms: 5,
            checksum: Some("abc".into()),
            error_message: None,
        }
    }

    #[test]
    fn test_qualified_columns() {
        assert_eq!(qualified("id, name", "e"), "e.id, e.name");
    }

    #[test]
    fn test_insert_operation_returns_increasing_ids() {
        let conn = ledger_conn();
        let ledger = SqliteLedger::new(&conn, "l_").unwrap();
        let first = ledger.insert_operation(&new_op("a")).unwrap();
        let second = ledger.insert_operation(&new_op("b")).unwrap();
        assert!(first > 0);
        assert!(second > first);
    }

    #[test]
    fn test_commit_direction_stored_as_change() {
        let conn = ledger_conn();
        let ledger = SqliteLedger::new(&conn, "l_").unwrap();
        let id = ledger.insert_operation(&new_op("a")).unwrap();
        let label: String = conn
            .query_row("SELECT direction FROM l_operations WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(label, "change");
    }

    #[test]
    fn test_finalize_only_once() {
        let conn = ledger_conn();
        let ledger = SqliteLedger::new(&conn, "l_").unwrap();
        let id = ledger.insert_operation(&new_op("a")).unwrap();
        assert_eq!(ledger.finalize_operation(id, &success()).unwrap(), 1);
        assert_eq!(ledger.finalize_operation(id, &success()).unwrap(), 0);
        assert_eq!(ledger.finalize_operation(9999, &success()).unwrap(), 0);
    }

    #[test]
    fn test_executions_frozen_after_finalize() {
        let conn = ledger_conn();
        let ledger = SqliteLedger::new(&conn, "l_").unwrap();
        let id = ledger.insert_operation(&new_op("a")).unwrap();
        let planned = [PlannedFile {
            filepath: "sql/001.sql".into(),
            file_type: FileType::Sql,
            checksum: "c1".into(),
        }];
        assert_eq!(ledger.insert_pending_executions(id, &planned).unwrap(), 1);
        ledger.finalize_operation(id, &success()).unwrap();

        let update = ExecutionUpdate {
            status: ExecutionStatus::Success,
            duration_ms: Some(1),
            error_message: None,
            skip_reason: None,
        };
        assert_eq!(ledger.update_pending_execution(id, "sql/001.sql", &update).unwrap(), 0);
        assert_eq!(ledger.skip_pending_executions(id, SkipReason::Cancelled).unwrap(), 0);
        assert!(matches!(
            ledger.create_pending(id, &planned),
            Err(SqliteError::OperationNotPending(op)) if op == id
        ));
        let err = ledger.insert_pending_executions(id, &planned).unwrap_err();
        assert_eq!(err.0, format!("operation {id} is missing or already finalized"));
    }
}
