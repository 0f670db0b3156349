//! Core ledger types and capability traits for sqlrun.
//!
//! This crate defines the shared vocabulary of the execution engine:
//!
//! - [`OperationRecord`]: parent ledger record for one tracked batch or
//!   single-file run.
//! - [`ExecutionRecord`]: child record for one file's outcome.
//! - [`NeedsRun`]: the tracker's decision for a file or changeset.
//! - [`BatchResult`] / [`FileResult`]: what callers get back from a run.
//!
//! Every status and reason field is an explicit enum with a stable string
//! label, so storage backends never deal in loose strings.
//!
//! The [`LedgerStore`] and [`SqlExecutor`] traits are the seams at which a
//! concrete database (see `sqlrun-sqlite`) plugs into the engine.
//!
//! # Example
//!
//! ```
//! use sqlrun_core::*;
//!
//! let decision = NeedsRun::Skip {
//!     reason: SkipReason::Unchanged,
//!     previous_checksum: Some("e3b0c442".into()),
//! };
//! assert!(!decision.needs_run());
//! assert_eq!(decision.skip_reason(), Some(SkipReason::Unchanged));
//! ```

mod ledger;
mod result;
mod types;

pub use ledger::{ExecError, ExecErrorKind, LedgerError, LedgerResult, LedgerStore, SqlExecutor};
pub use result::{BatchResult, BatchStatus, FailureKind, FileResult, FileStatus};
pub use types::*;
