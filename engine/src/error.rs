//! Error types for the execution engine.

use std::path::PathBuf;

use sqlrun_core::LedgerError;
use sqlrun_files::FilesError;
use thiserror::Error;

/// A ledger write did not take effect.
///
/// Returned by the tracker's write operations so the caller can decide how
/// severe it is. Outside strict mode these are logged and emitted as error
/// events, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ledger write failed ({action}): {message}")]
pub struct LedgerWriteError {
    /// Which write failed, e.g. `finalize operation 7`.
    pub action: String,
    pub message: String,
}

impl LedgerWriteError {
    pub fn new(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            message: message.into(),
        }
    }
}

/// Errors that stop an engine call before it can return a batch result.
///
/// Per-file failures are not errors at this level; they are recorded in
/// the returned [`BatchResult`](sqlrun_core::BatchResult).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Discovery, checksum, or config failure from the files crate.
    #[error(transparent)]
    Files(#[from] FilesError),

    /// The batch's operation could not be created; no file was run.
    #[error("failed to create operation: {0}")]
    OperationCreate(#[source] LedgerError),

    /// A ledger write failed while strict ledger mode is on.
    #[error(transparent)]
    LedgerWrite(#[from] LedgerWriteError),

    /// A ledger read needed to answer a listing failed.
    #[error("failed to read ledger: {0}")]
    LedgerRead(#[source] LedgerError),

    /// Preview or dry-run output could not be written.
    #[error("cannot write '{}': {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid changeset '{name}': {reason}")]
    ChangesetValidation { name: String, reason: String },

    #[error("changeset '{0}' not found")]
    ChangesetNotFound(String),

    /// Revert requested for a changeset that is not currently applied.
    #[error("changeset '{0}' has not been applied")]
    ChangesetNotApplied(String),

    /// The changeset has ledger history but its folder is gone.
    #[error("changeset '{0}' is orphaned: history exists but the folder is missing")]
    ChangesetOrphaned(String),
}

/// Convenience alias for results with [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;
