//! Execution engine for sqlrun: tracker, runner, and changeset engine.
//!
//! The engine sits between the filesystem crate (`sqlrun-files`) and a
//! storage backend such as `sqlrun-sqlite`, talking to the backend only
//! through the [`LedgerStore`](sqlrun_core::LedgerStore) and
//! [`SqlExecutor`](sqlrun_core::SqlExecutor) traits.
//!
//! - [`Tracker`] decides whether a file or changeset needs to run and
//!   writes every outcome to the ledger.
//! - [`Runner`] executes batches of files in order, in tracked, dry-run, or
//!   preview mode.
//! - [`ChangesetEngine`] applies and reverts dated changeset folders as
//!   units, and derives their status from ledger history.
//!
//! Progress is reported through an [`EventSink`]; templates are rendered
//! through a [`TemplateEngine`].
//!
//! # Example
//!
//! ```
//! use rusqlite::Connection;
//! use sqlrun_engine::{ChangesetEngine, ChangesetStatus, NullSink, RunContext, RunOptions, Runner};
//! use sqlrun_files::ProjectConfig;
//! use sqlrun_sqlite::{LedgerMigration, SqliteExecutor, SqliteLedger};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let change = dir.path().join("changes/2024-01-15-add-users/change");
//! std::fs::create_dir_all(&change).unwrap();
//! std::fs::write(change.join("001.sql"), "CREATE TABLE users (id INTEGER);").unwrap();
//!
//! let config = ProjectConfig::new("dev", "dev.db");
//! let conn = Connection::open_in_memory().unwrap();
//! LedgerMigration::new(&conn, &config.ledger.prefix).unwrap().up().unwrap();
//! let ledger = SqliteLedger::new(&conn, &config.ledger.prefix).unwrap();
//! let exec = SqliteExecutor::new(&conn);
//!
//! let runner = Runner::new(RunContext::new(dir.path(), &config, &ledger, &exec).with_events(&NullSink));
//! let changes = ChangesetEngine::new(&runner);
//!
//! let result = changes.run("2024-01-15-add-users", &RunOptions::default()).unwrap();
//! assert!(result.is_success());
//! assert_eq!(changes.status("2024-01-15-add-users").unwrap(), ChangesetStatus::Success);
//! ```

use std::time::Instant;

mod changeset;
mod error;
mod events;
mod identity;
mod runner;
mod template;
mod tracker;

pub use changeset::{
    CHANGE_DIR, Changeset, ChangesetEngine, ChangesetEntry, ChangesetRun, ChangesetStatus,
    REVERT_DIR, derive_status, discover_changesets, parse_changeset_name, validate_changeset,
};
pub use error::{EngineError, LedgerWriteError, Result};
pub use events::{Event, EventSink, NullSink, RecordingSink, TracingSink};
pub use identity::Identity;
pub use runner::{CancelToken, RunContext, RunMode, RunOptions, Runner, ledger_path};
pub use template::{RenderContext, Rendered, TemplateEngine, TemplateError, VarTemplates};
pub use tracker::Tracker;

/// Milliseconds since `started`, saturating.
pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
