//! Capability traits consumed by the execution engine.
//!
//! The engine never talks to a database driver directly. It is handed a
//! [`LedgerStore`] for the audit trail and a [`SqlExecutor`] for running raw
//! SQL; both usually wrap the same open connection, which the caller owns.

use thiserror::Error;

use crate::types::{
    ChangeType, ExecutionLookup, ExecutionRecord, ExecutionUpdate, NewExecution, NewOperation,
    OperationFinal, OperationQuery, OperationRecord, PlannedFile, SkipReason,
};

/// A ledger read or write failed inside the store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ledger error: {0}")]
pub struct LedgerError(pub String);

/// Convenience alias for results with [`LedgerError`].
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Persistence for operations and executions.
///
/// Write methods that target existing rows return the number of rows they
/// changed so callers can tell "not found" from success. Implementations
/// must refuse to touch execution rows whose parent operation is no longer
/// pending.
pub trait LedgerStore {
    /// Inserts a pending operation and returns its id.
    ///
    /// The returned id is always positive. Adapters whose driver cannot
    /// reliably return generated keys fall back to their own
    /// last-insert-id query here rather than at call sites.
    fn insert_operation(&self, op: &NewOperation) -> LedgerResult<i64>;

    /// Writes the terminal state of a pending operation.
    fn finalize_operation(&self, id: i64, outcome: &OperationFinal) -> LedgerResult<usize>;

    /// Inserts one complete execution row and returns its id.
    fn insert_execution(&self, exec: &NewExecution) -> LedgerResult<i64>;

    /// Inserts a pending execution row per planned file.
    fn insert_pending_executions(
        &self,
        operation_id: i64,
        files: &[PlannedFile],
    ) -> LedgerResult<usize>;

    /// Moves the pending row for `filepath` under `operation_id` to a
    /// terminal state.
    fn update_pending_execution(
        &self,
        operation_id: i64,
        filepath: &str,
        update: &ExecutionUpdate,
    ) -> LedgerResult<usize>;

    /// Marks every still-pending row under `operation_id` as skipped.
    fn skip_pending_executions(&self, operation_id: i64, reason: SkipReason)
    -> LedgerResult<usize>;

    /// Returns the most recent execution for a file in a config, ignoring
    /// changeset operations and the rows of `exclude_operation`.
    ///
    /// Rows skipped as `unchanged` or `already-run` carry no new
    /// information and are passed over, so the run they deferred to stays
    /// authoritative.
    fn latest_execution(
        &self,
        filepath: &str,
        config_name: &str,
        exclude_operation: Option<i64>,
    ) -> LedgerResult<Option<ExecutionLookup>>;

    /// Returns the most recent operation matching `query`.
    fn latest_operation(&self, query: &OperationQuery<'_>) -> LedgerResult<Option<OperationRecord>>;

    /// Lists operations for a config, oldest first, optionally filtered by
    /// change type.
    fn operations(
        &self,
        config_name: &str,
        change_type: Option<ChangeType>,
    ) -> LedgerResult<Vec<OperationRecord>>;

    /// Lists the executions owned by an operation in insertion order.
    fn executions(&self, operation_id: i64) -> LedgerResult<Vec<ExecutionRecord>>;

    /// Marks every finalized operation of a config as stale.
    fn mark_stale(&self, config_name: &str) -> LedgerResult<usize>;
}

/// How a raw SQL execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    /// The database rejected the SQL.
    Sql,
    /// The connection was interrupted or closed while the SQL was running.
    Interrupted,
}

/// Failure reported by a [`SqlExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub message: String,
}

impl ExecError {
    pub fn sql(message: impl Into<String>) -> Self {
        Self {
            kind: ExecErrorKind::Sql,
            message: message.into(),
        }
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self {
            kind: ExecErrorKind::Interrupted,
            message: message.into(),
        }
    }
}

/// Pass-through execution of raw, dialect-specific SQL.
///
/// Implementations must not wrap the SQL in a transaction of their own;
/// many DDL statements are not transactional.
pub trait SqlExecutor {
    fn execute_raw(&self, sql: &str) -> std::result::Result<(), ExecError>;
}
