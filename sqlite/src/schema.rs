//! Ledger table DDL with customizable table prefixes.
//!
//! Generates the `CREATE TABLE` and `CREATE INDEX` statements for the two
//! ledger tables. All names are prefixed with a configurable string so the
//! ledger can live alongside user tables in the target database.
//!
//! # Table structure
//!
//! - `{prefix}operations`: one row per tracked batch or single-file run
//! - `{prefix}executions`: one row per file outcome, owned by an operation
//!
//! Executions are looked up by `filepath` (joined to the owning operation's
//! `config_name`) and by `change_id`.

use crate::error::{Result, SqliteError};

/// Validates that a table prefix contains only alphanumeric characters and underscores.
pub(crate) fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(SqliteError::InvalidPrefix(prefix.to_string()));
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SqliteError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// Generates the ledger schema for the given prefix.
///
/// # Errors
///
/// Returns [`SqliteError::InvalidPrefix`] if the prefix contains characters
/// other than alphanumerics and underscores, or if it is empty.
pub fn generate_ledger_sql(prefix: &str) -> Result<String> {
    validate_prefix(prefix)?;

    let sql = format!(
        r#"
CREATE TABLE IF NOT EXISTS {prefix}operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    change_type TEXT NOT NULL CHECK (change_type IN ('build', 'run', 'change')),
    direction TEXT NOT NULL CHECK (direction IN ('change', 'revert')),
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'success', 'failed', 'stale')),
    config_name TEXT NOT NULL,
    executed_by TEXT NOT NULL,
    checksum TEXT,
    duration_ms INTEGER,
    error_message TEXT,
    executed_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS {prefix}executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    change_id INTEGER NOT NULL,
    filepath TEXT NOT NULL,
    file_type TEXT NOT NULL CHECK (file_type IN ('sql', 'template')),
    checksum TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'success', 'failed', 'skipped')),
    skip_reason TEXT,
    error_message TEXT,
    duration_ms INTEGER,
    FOREIGN KEY (change_id) REFERENCES {prefix}operations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_{prefix}executions_filepath ON {prefix}executions(filepath);
CREATE INDEX IF NOT EXISTS idx_{prefix}executions_change ON {prefix}executions(change_id);
CREATE INDEX IF NOT EXISTS idx_{prefix}operations_name ON {prefix}operations(name, config_name);
CREATE INDEX IF NOT EXISTS idx_{prefix}operations_config ON {prefix}operations(config_name);
"#,
        prefix = prefix
    );

    Ok(sql)
}

/// Generates SQL to drop the ledger tables in reverse dependency order.
///
/// # Errors
///
/// Returns [`SqliteError::InvalidPrefix`] if the prefix is invalid.
pub fn generate_drop_sql(prefix: &str) -> Result<String> {
    validate_prefix(prefix)?;

    let sql = format!(
        r#"
DROP TABLE IF EXISTS {prefix}executions;
DROP TABLE IF EXISTS {prefix}operations;
"#,
        prefix = prefix
    );

    Ok(sql)
}
