//! Conversion between ledger types and SQLite rows.
//!
//! Rows are read into plain raw structs inside the rusqlite row closure and
//! converted to [`OperationRecord`]/[`ExecutionRecord`] afterwards, so label
//! parsing failures surface as [`SqliteError::ConversionError`] instead of
//! being squeezed through `rusqlite::Error`.
//!
//! # Direction labels
//!
//! The in-memory [`Direction::Commit`] is persisted as `"change"`, a legacy
//! label kept for compatibility with existing ledgers. [`DIRECTION_LABELS`]
//! is the only place that mapping exists.

use rusqlite::Row;
use sqlrun_core::{Direction, ExecutionRecord, OperationRecord, SkipReason};

use crate::error::{Result, SqliteError};

/// Persisted label for each in-memory direction.
pub(crate) const DIRECTION_LABELS: [(Direction, &str); 2] =
    [(Direction::Commit, "change"), (Direction::Revert, "revert")];

/// Column list matching [`RawOperation::from_row`].
pub(crate) const OPERATION_COLUMNS: &str = "id, name, change_type, direction, status, \
     config_name, executed_by, checksum, duration_ms, error_message, executed_at";

/// Column list matching [`RawExecution::from_row`].
pub(crate) const EXECUTION_COLUMNS: &str = "id, change_id, filepath, file_type, checksum, \
     status, skip_reason, error_message, duration_ms";

/// Converts a [`Direction`] to its persisted label.
pub(crate) fn direction_to_label(direction: Direction) -> &'static str {
    DIRECTION_LABELS
        .iter()
        .find(|(d, _)| *d == direction)
        .map(|(_, label)| *label)
        .unwrap_or("change")
}

/// Parses a persisted label back into a [`Direction`].
pub(crate) fn label_to_direction(label: &str) -> Result<Direction> {
    DIRECTION_LABELS
        .iter()
        .find(|(_, l)| *l == label)
        .map(|(d, _)| *d)
        .ok_or_else(|| SqliteError::ConversionError(format!("unknown direction label: {label}")))
}

pub(crate) fn millis_to_sql(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn millis_from_sql(ms: Option<i64>) -> Option<u64> {
    ms.map(|v| u64::try_from(v).unwrap_or(0))
}

/// Operation row as stored.
pub(crate) struct RawOperation {
    id: i64,
    name: String,
    change_type: String,
    direction: String,
    status: String,
    config_name: String,
    executed_by: String,
    checksum: Option<String>,
    duration_ms: Option<i64>,
    error_message: Option<String>,
    executed_at: String,
}

impl RawOperation {
    /// Reads the columns listed in [`OPERATION_COLUMNS`], starting at `offset`.
    pub(crate) fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            name: row.get(offset + 1)?,
            change_type: row.get(offset + 2)?,
            direction: row.get(offset + 3)?,
            status: row.get(offset + 4)?,
            config_name: row.get(offset + 5)?,
            executed_by: row.get(offset + 6)?,
            checksum: row.get(offset + 7)?,
            duration_ms: row.get(offset + 8)?,
            error_message: row.get(offset + 9)?,
            executed_at: row.get(offset + 10)?,
        })
    }

    pub(crate) fn into_record(self) -> Result<OperationRecord> {
        Ok(OperationRecord {
            id: self.id,
            name: self.name,
            change_type: self.change_type.parse()?,
            direction: label_to_direction(&self.direction)?,
            status: self.status.parse()?,
            config_name: self.config_name,
            executed_by: self.executed_by,
            checksum: self.checksum,
            duration_ms: millis_from_sql(self.duration_ms),
            error_message: self.error_message,
            executed_at: self.executed_at,
        })
    }
}

/// Execution row as stored.
pub(crate) struct RawExecution {
    id: i64,
    change_id: i64,
    filepath: String,
    file_type: String,
    checksum: String,
    status: String,
    skip_reason: Option<String>,
    error_message: Option<String>,
    duration_ms: Option<i64>,
}

impl RawExecution {
    /// Reads the columns listed in [`EXECUTION_COLUMNS`], starting at `offset`.
    pub(crate) fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            change_id: row.get(offset + 1)?,
            filepath: row.get(offset + 2)?,
            file_type: row.get(offset + 3)?,
            checksum: row.get(offset + 4)?,
            status: row.get(offset + 5)?,
            skip_reason: row.get(offset + 6)?,
            error_message: row.get(offset + 7)?,
            duration_ms: row.get(offset + 8)?,
        })
    }

    pub(crate) fn into_record(self) -> Result<ExecutionRecord> {
        Ok(ExecutionRecord {
            id: self.id,
            change_id: self.change_id,
            filepath: self.filepath,
            file_type: self.file_type.parse()?,
            checksum: self.checksum,
            status: self.status.parse()?,
            skip_reason: self
                .skip_reason
                .as_deref()
                .map(|s| s.parse::<SkipReason>())
                .transpose()?,
            error_message: self.error_message,
            duration_ms: millis_from_sql(self.duration_ms),
        })
    }
}
