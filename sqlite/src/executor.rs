//! Raw SQL execution against a SQLite connection.

use rusqlite::{Connection, ErrorCode, InterruptHandle};
use sqlrun_core::{ExecError, SqlExecutor};

/// Executes SQL text as-is with `execute_batch`.
///
/// No transaction is opened around the text; a file that wants one writes
/// its own `BEGIN`/`COMMIT`.
///
/// # Examples
///
/// ```
/// use rusqlite::Connection;
/// use sqlrun_core::SqlExecutor;
/// use sqlrun_sqlite::SqliteExecutor;
///
/// let conn = Connection::open_in_memory().unwrap();
/// let exec = SqliteExecutor::new(&conn);
/// exec.execute_raw("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1);").unwrap();
/// assert!(exec.execute_raw("SELEC nope").is_err());
/// ```
pub struct SqliteExecutor<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteExecutor<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Handle that can abort the statement currently running on this
    /// connection from another thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }
}

impl SqlExecutor for SqliteExecutor<'_> {
    fn execute_raw(&self, sql: &str) -> Result<(), ExecError> {
        self.conn.execute_batch(sql).map_err(|err| {
            if err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
                ExecError::interrupted(err.to_string())
            } else {
                ExecError::sql(err.to_string())
            }
        })
    }
}
