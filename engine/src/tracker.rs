//! The ledger authority: has this run, and does it need to run again.
//!
//! [`Tracker`] wraps a [`LedgerStore`] scoped to one config name and
//! applies the engine's propagation policy on top of it:
//!
//! - ledger **reads** fail open. A lookup error means "needs run" plus an
//!   error event, never a silent skip.
//! - ledger **writes** return a [`LedgerWriteError`] describing what did
//!   not happen. [`Tracker::absorb`] turns that into an error event and,
//!   only in strict mode, a hard [`EngineError::LedgerWrite`].
//! - creating an operation is the one write that is always fatal.

use sqlrun_core::{
    ChangeType, Direction, ExecutionRecord, ExecutionStatus, ExecutionUpdate, LedgerError,
    LedgerStore, NeedsRun, NeedsRunReason, NewExecution, NewOperation, OperationFinal,
    OperationQuery, OperationRecord, OperationStatus, PlannedFile, SkipReason,
};
use tracing::{debug, warn};

use crate::error::{EngineError, LedgerWriteError, Result};
use crate::events::{Event, EventSink};

/// Ledger access for one config.
pub struct Tracker<'a> {
    store: &'a dyn LedgerStore,
    events: &'a dyn EventSink,
    config_name: String,
    strict: bool,
}

impl<'a> Tracker<'a> {
    pub fn new(
        store: &'a dyn LedgerStore,
        events: &'a dyn EventSink,
        config_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            events,
            config_name: config_name.into(),
            strict: false,
        }
    }

    /// Makes ledger write failures fatal.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn config_name(&self) -> &str {
        &self.config_name
    }

    /// Decides whether a file must run, looking at its full history.
    pub fn needs_run(&self, filepath: &str, checksum: &str, force: bool) -> NeedsRun {
        self.decide_file(filepath, checksum, force, None)
    }

    /// Like [`needs_run`](Self::needs_run), ignoring the rows of the
    /// operation that is currently executing.
    pub fn needs_run_within(
        &self,
        operation_id: i64,
        filepath: &str,
        checksum: &str,
        force: bool,
    ) -> NeedsRun {
        self.decide_file(filepath, checksum, force, Some(operation_id))
    }

    fn decide_file(
        &self,
        filepath: &str,
        checksum: &str,
        force: bool,
        exclude: Option<i64>,
    ) -> NeedsRun {
        if force {
            return NeedsRun::run(NeedsRunReason::Force);
        }

        let found = match self.store.latest_execution(filepath, &self.config_name, exclude) {
            Ok(Some(found)) => found,
            Ok(None) => return NeedsRun::run(NeedsRunReason::New),
            Err(err) => {
                self.read_failed(&format!("needs-run lookup for {filepath}"), &err);
                return NeedsRun::run(NeedsRunReason::New);
            }
        };

        let previous_checksum = Some(found.execution.checksum.clone());
        let reason = match found.execution.status {
            ExecutionStatus::Failed => NeedsRunReason::Failed,
            ExecutionStatus::Pending | ExecutionStatus::Skipped => NeedsRunReason::New,
            ExecutionStatus::Success if found.operation_status == OperationStatus::Stale => {
                NeedsRunReason::Stale
            }
            ExecutionStatus::Success if found.execution.checksum != checksum => {
                NeedsRunReason::Changed
            }
            ExecutionStatus::Success => {
                return NeedsRun::Skip {
                    reason: SkipReason::Unchanged,
                    previous_checksum,
                };
            }
        };
        NeedsRun::Run {
            reason,
            previous_checksum,
        }
    }

    /// Decides whether a changeset must be applied, keyed by its name and
    /// the combined checksum of its change files.
    pub fn needs_run_by_name(&self, name: &str, checksum: &str, force: bool) -> NeedsRun {
        if force {
            return NeedsRun::run(NeedsRunReason::Force);
        }

        let (commit, revert) = match (
            self.latest_change(name, Direction::Commit),
            self.latest_change(name, Direction::Revert),
        ) {
            (Ok(commit), Ok(revert)) => (commit, revert),
            (Err(err), _) | (_, Err(err)) => {
                self.read_failed(&format!("needs-run lookup for changeset {name}"), &err);
                return NeedsRun::run(NeedsRunReason::New);
            }
        };

        let Some(commit) = commit else {
            return NeedsRun::run(NeedsRunReason::New);
        };
        let previous_checksum = commit.checksum.clone();

        let reverted = revert
            .as_ref()
            .is_some_and(|r| r.id > commit.id && r.status == OperationStatus::Success);
        let reason = if reverted {
            NeedsRunReason::Reverted
        } else {
            match commit.status {
                OperationStatus::Failed => NeedsRunReason::Failed,
                OperationStatus::Pending => NeedsRunReason::New,
                OperationStatus::Stale => NeedsRunReason::Stale,
                OperationStatus::Success if commit.checksum.as_deref() != Some(checksum) => {
                    NeedsRunReason::Changed
                }
                OperationStatus::Success => {
                    return NeedsRun::Skip {
                        reason: SkipReason::AlreadyRun,
                        previous_checksum,
                    };
                }
            }
        };
        NeedsRun::Run {
            reason,
            previous_checksum,
        }
    }

    fn latest_change(
        &self,
        name: &str,
        direction: Direction,
    ) -> std::result::Result<Option<OperationRecord>, LedgerError> {
        self.store.latest_operation(&OperationQuery {
            name,
            config_name: &self.config_name,
            change_type: ChangeType::Change,
            direction,
        })
    }

    /// Opens a pending operation. Failure is always fatal.
    pub fn create_operation(
        &self,
        name: &str,
        change_type: ChangeType,
        direction: Direction,
        executed_by: &str,
    ) -> Result<i64> {
        let id = self
            .store
            .insert_operation(&NewOperation {
                name: name.to_string(),
                change_type,
                direction,
                config_name: self.config_name.clone(),
                executed_by: executed_by.to_string(),
            })
            .map_err(EngineError::OperationCreate)?;
        debug!(operation_id = id, %name, "operation created");
        Ok(id)
    }

    /// Inserts one complete execution row. Failure is soft unless strict.
    pub fn record_execution(&self, exec: &NewExecution) -> Result<()> {
        let written = self.store.insert_execution(exec).map(|_| ()).map_err(|err| {
            LedgerWriteError::new(
                format!("record {} in operation {}", exec.filepath, exec.change_id),
                err.0,
            )
        });
        self.absorb(written)
    }

    /// Writes the operation's terminal state.
    pub fn finalize_operation(
        &self,
        id: i64,
        outcome: &OperationFinal,
    ) -> std::result::Result<(), LedgerWriteError> {
        let action = || format!("finalize operation {id}");
        match self.store.finalize_operation(id, outcome) {
            Ok(0) => Err(LedgerWriteError::new(
                action(),
                "no pending operation with that id",
            )),
            Ok(_) => Ok(()),
            Err(err) => Err(LedgerWriteError::new(action(), err.0)),
        }
    }

    /// Inserts a pending row for every planned file.
    pub fn create_file_records(
        &self,
        operation_id: i64,
        files: &[PlannedFile],
    ) -> std::result::Result<(), LedgerWriteError> {
        let action = || format!("create pending rows for operation {operation_id}");
        match self.store.insert_pending_executions(operation_id, files) {
            Ok(n) if n == files.len() => Ok(()),
            Ok(n) => Err(LedgerWriteError::new(
                action(),
                format!("inserted {n} of {} rows", files.len()),
            )),
            Err(err) => Err(LedgerWriteError::new(action(), err.0)),
        }
    }

    /// Moves a file's pending row to its terminal state.
    pub fn update_file_execution(
        &self,
        operation_id: i64,
        filepath: &str,
        update: &ExecutionUpdate,
    ) -> std::result::Result<(), LedgerWriteError> {
        let action = || format!("update {filepath} in operation {operation_id}");
        match self.store.update_pending_execution(operation_id, filepath, update) {
            Ok(0) => Err(LedgerWriteError::new(action(), "no matching pending row")),
            Ok(_) => Ok(()),
            Err(err) => Err(LedgerWriteError::new(action(), err.0)),
        }
    }

    /// Marks every still-pending row of the operation as skipped.
    pub fn skip_remaining_files(
        &self,
        operation_id: i64,
        reason: SkipReason,
    ) -> std::result::Result<usize, LedgerWriteError> {
        self.store
            .skip_pending_executions(operation_id, reason)
            .map_err(|err| {
                LedgerWriteError::new(format!("skip pending rows of operation {operation_id}"), err.0)
            })
    }

    /// Marks every finalized operation of this config stale, so the next
    /// run re-executes everything.
    pub fn mark_stale(&self) -> Result<usize> {
        let count = self.store.mark_stale(&self.config_name).map_err(|err| {
            LedgerWriteError::new(format!("mark {} stale", self.config_name), err.0)
        })?;
        debug!(config = %self.config_name, count, "operations marked stale");
        Ok(count)
    }

    /// Every changeset operation for this config, oldest first.
    pub fn changeset_operations(&self) -> Result<Vec<OperationRecord>> {
        self.store
            .operations(&self.config_name, Some(ChangeType::Change))
            .map_err(EngineError::LedgerRead)
    }

    /// Operations recorded for one changeset name, oldest first.
    pub fn history(&self, name: &str) -> Result<Vec<OperationRecord>> {
        let mut ops = self.changeset_operations()?;
        ops.retain(|op| op.name == name);
        Ok(ops)
    }

    /// Every operation for this config, oldest first.
    pub fn operations(&self) -> Result<Vec<OperationRecord>> {
        self.store
            .operations(&self.config_name, None)
            .map_err(EngineError::LedgerRead)
    }

    pub fn executions(&self, operation_id: i64) -> Result<Vec<ExecutionRecord>> {
        self.store
            .executions(operation_id)
            .map_err(EngineError::LedgerRead)
    }

    /// Applies the write-failure policy: emit and log, and fail only in
    /// strict mode.
    pub fn absorb<T>(&self, result: std::result::Result<T, LedgerWriteError>) -> Result<()> {
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(action = %err.action, error = %err.message, strict = self.strict, "ledger write failed");
                self.events.emit(&Event::Error {
                    context: err.action.clone(),
                    message: err.message.clone(),
                });
                if self.strict { Err(err.into()) } else { Ok(()) }
            }
        }
    }

    fn read_failed(&self, context: &str, err: &LedgerError) {
        warn!(%context, error = %err, "ledger read failed; assuming needs-run");
        self.events.emit(&Event::Error {
            context: context.to_string(),
            message: err.to_string(),
        });
    }
}
