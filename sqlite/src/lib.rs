//! SQLite backend for the sqlrun ledger.
//!
//! This crate plugs a SQLite database into the engine's two seams:
//!
//! - [`SqliteLedger`] implements [`LedgerStore`](sqlrun_core::LedgerStore)
//!   over the `{prefix}operations` and `{prefix}executions` tables.
//! - [`SqliteExecutor`] implements [`SqlExecutor`](sqlrun_core::SqlExecutor)
//!   by passing file contents straight to `execute_batch`.
//!
//! # Architecture
//!
//! - **`schema`**: DDL generation with customizable table prefixes
//! - **`migration`**: Ledger lifecycle (up/down/status)
//! - **`convert`**: Row ↔ record conversion and persisted labels
//! - **`ledger`**: The store implementation
//! - **`executor`**: Raw SQL execution
//!
//! # Quick start
//!
//! ```
//! use rusqlite::Connection;
//! use sqlrun_core::{LedgerStore, SqlExecutor};
//! use sqlrun_sqlite::{LedgerMigration, SqliteExecutor, SqliteLedger};
//!
//! let conn = Connection::open_in_memory().unwrap();
//! LedgerMigration::new(&conn, "__sqlrun_").unwrap().up().unwrap();
//!
//! let ledger = SqliteLedger::new(&conn, "__sqlrun_").unwrap();
//! let exec = SqliteExecutor::new(&conn);
//!
//! exec.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY);").unwrap();
//! assert!(ledger.operations("dev", None).unwrap().is_empty());
//! ```
//!
//! # Table prefix customization
//!
//! All table and index names carry a configurable prefix so the ledger can
//! share a database with application tables. Prefixes must contain only
//! alphanumeric characters and underscores.

mod convert;
mod error;
mod executor;
mod ledger;
mod migration;
mod schema;

pub use error::{Result, SqliteError};
pub use executor::SqliteExecutor;
pub use ledger::SqliteLedger;
pub use migration::{LedgerMigration, LedgerStatus};
pub use schema::{generate_drop_sql, generate_ledger_sql};
