//! Ledger type definitions.
//!
//! This module defines the data model persisted by a
//! [`LedgerStore`](crate::LedgerStore): parent [`OperationRecord`]s, their
//! child [`ExecutionRecord`]s, and the tagged unions used for every status
//! and reason field. All enums carry a stable string form via `as_str` and
//! [`FromStr`], which is what storage backends write to their tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a persisted label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} label: {label}")]
pub struct UnknownLabel {
    /// Which enum was being parsed (e.g. `"operation status"`).
    pub kind: &'static str,
    /// The offending label.
    pub label: String,
}

impl UnknownLabel {
    fn new(kind: &'static str, label: &str) -> Self {
        Self {
            kind,
            label: label.to_string(),
        }
    }
}

/// What kind of batch an operation records.
///
/// # Examples
///
/// ```
/// use sqlrun_core::ChangeType;
///
/// assert_eq!(ChangeType::Build.as_str(), "build");
/// assert_eq!("change".parse::<ChangeType>().unwrap(), ChangeType::Change);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Full build from the SQL directory.
    Build,
    /// Ad-hoc run of a file, directory, or file list.
    Run,
    /// A changeset applied or reverted by name.
    Change,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Build => "build",
            ChangeType::Run => "run",
            ChangeType::Change => "change",
        }
    }
}

impl FromStr for ChangeType {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(ChangeType::Build),
            "run" => Ok(ChangeType::Run),
            "change" => Ok(ChangeType::Change),
            other => Err(UnknownLabel::new("change type", other)),
        }
    }
}

/// Direction of an operation.
///
/// In memory a forward application is [`Direction::Commit`]. Storage
/// backends persist it under the legacy label `"change"`; that mapping
/// belongs to the backend, not to this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Forward application.
    Commit,
    /// Rollback.
    Revert,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Commit => "commit",
            Direction::Revert => "revert",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a parent operation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Created, not yet finalized.
    Pending,
    /// Finalized with zero failed files.
    Success,
    /// Finalized with at least one failed file.
    Failed,
    /// The schema this operation built was torn down since.
    Stale,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Success => "success",
            OperationStatus::Failed => "failed",
            OperationStatus::Stale => "stale",
        }
    }
}

impl FromStr for OperationStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OperationStatus::Pending),
            "success" => Ok(OperationStatus::Success),
            "failed" => Ok(OperationStatus::Failed),
            "stale" => Ok(OperationStatus::Stale),
            other => Err(UnknownLabel::new("operation status", other)),
        }
    }
}

/// Status of a single file execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            "skipped" => Ok(ExecutionStatus::Skipped),
            other => Err(UnknownLabel::new("execution status", other)),
        }
    }
}

/// Why a file or changeset was not executed.
///
/// # Examples
///
/// ```
/// use sqlrun_core::SkipReason;
///
/// assert_eq!(SkipReason::BatchAborted.as_str(), "batch-aborted");
/// assert_eq!("already-run".parse::<SkipReason>().unwrap(), SkipReason::AlreadyRun);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// File checksum matches the last successful execution.
    Unchanged,
    /// Changeset was already applied with the same checksum.
    AlreadyRun,
    /// An earlier file in the batch failed with abort-on-error enabled.
    BatchAborted,
    /// The batch was cancelled before this file started.
    Cancelled,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Unchanged => "unchanged",
            SkipReason::AlreadyRun => "already-run",
            SkipReason::BatchAborted => "batch-aborted",
            SkipReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkipReason {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unchanged" => Ok(SkipReason::Unchanged),
            "already-run" => Ok(SkipReason::AlreadyRun),
            "batch-aborted" => Ok(SkipReason::BatchAborted),
            "cancelled" => Ok(SkipReason::Cancelled),
            other => Err(UnknownLabel::new("skip reason", other)),
        }
    }
}

/// Kind of file recorded on an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Plain SQL executed as-is.
    Sql,
    /// Templated SQL rendered before execution.
    Template,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Sql => "sql",
            FileType::Template => "template",
        }
    }
}

impl FromStr for FileType {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql" => Ok(FileType::Sql),
            "template" => Ok(FileType::Template),
            other => Err(UnknownLabel::new("file type", other)),
        }
    }
}

/// Why the tracker decided something must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeedsRunReason {
    /// Caller forced execution.
    Force,
    /// No authoritative prior record.
    New,
    /// Checksum differs from the recorded one.
    Changed,
    /// Previous attempt failed; retry.
    Failed,
    /// Prior record belongs to a torn-down schema.
    Stale,
    /// Changeset was reverted and is eligible to re-apply.
    Reverted,
}

impl NeedsRunReason {
    pub fn as_str(self) -> &'static str {
        match self {
            NeedsRunReason::Force => "force",
            NeedsRunReason::New => "new",
            NeedsRunReason::Changed => "changed",
            NeedsRunReason::Failed => "failed",
            NeedsRunReason::Stale => "stale",
            NeedsRunReason::Reverted => "reverted",
        }
    }
}

impl fmt::Display for NeedsRunReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tracker's needs-run decision. Never persisted.
///
/// # Examples
///
/// ```
/// use sqlrun_core::{NeedsRun, NeedsRunReason, SkipReason};
///
/// let run = NeedsRun::run(NeedsRunReason::Force);
/// assert!(run.needs_run());
///
/// let skip = NeedsRun::Skip { reason: SkipReason::Unchanged, previous_checksum: None };
/// assert!(!skip.needs_run());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum NeedsRun {
    Run {
        reason: NeedsRunReason,
        previous_checksum: Option<String>,
    },
    Skip {
        reason: SkipReason,
        previous_checksum: Option<String>,
    },
}

impl NeedsRun {
    /// A run decision with no previous checksum.
    pub fn run(reason: NeedsRunReason) -> Self {
        NeedsRun::Run {
            reason,
            previous_checksum: None,
        }
    }

    pub fn needs_run(&self) -> bool {
        matches!(self, NeedsRun::Run { .. })
    }

    /// The run reason, if this decision is to run.
    pub fn reason(&self) -> Option<NeedsRunReason> {
        match self {
            NeedsRun::Run { reason, .. } => Some(*reason),
            NeedsRun::Skip { .. } => None,
        }
    }

    /// The skip reason, if this decision is to skip.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            NeedsRun::Run { .. } => None,
            NeedsRun::Skip { reason, .. } => Some(*reason),
        }
    }

    pub fn previous_checksum(&self) -> Option<&str> {
        match self {
            NeedsRun::Run {
                previous_checksum, ..
            }
            | NeedsRun::Skip {
                previous_checksum, ..
            } => previous_checksum.as_deref(),
        }
    }
}

/// A persisted parent ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: i64,
    /// Human-readable label, typically timestamped or a changeset name.
    pub name: String,
    pub change_type: ChangeType,
    pub direction: Direction,
    pub status: OperationStatus,
    pub config_name: String,
    /// Formatted identity of whoever ran the operation.
    pub executed_by: String,
    /// Combined checksum, set on finalize.
    pub checksum: Option<String>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    /// Store-assigned creation timestamp.
    pub executed_at: String,
}

/// A persisted child ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    /// Owning operation id.
    pub change_id: i64,
    pub filepath: String,
    pub file_type: FileType,
    pub checksum: String,
    pub status: ExecutionStatus,
    pub skip_reason: Option<SkipReason>,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
}

/// The authoritative execution for a file together with its parent status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLookup {
    pub execution: ExecutionRecord,
    pub operation_status: OperationStatus,
}

/// Data needed to open a new operation. Status always starts as pending.
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub name: String,
    pub change_type: ChangeType,
    pub direction: Direction,
    pub config_name: String,
    pub executed_by: String,
}

/// Terminal state written by finalize.
#[derive(Debug, Clone)]
pub struct OperationFinal {
    pub status: OperationStatus,
    pub duration_ms: u64,
    pub checksum: Option<String>,
    pub error_message: Option<String>,
}

/// A complete execution row inserted in one step.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub change_id: i64,
    pub filepath: String,
    pub file_type: FileType,
    pub checksum: String,
    pub status: ExecutionStatus,
    pub skip_reason: Option<SkipReason>,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
}

/// A file planned for a batch, inserted as a pending row up front.
#[derive(Debug, Clone)]
pub struct PlannedFile {
    pub filepath: String,
    pub file_type: FileType,
    pub checksum: String,
}

/// Transition of a pending execution row to its terminal state.
#[derive(Debug, Clone)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub skip_reason: Option<SkipReason>,
}

/// Selects the most recent operation for a name.
#[derive(Debug, Clone)]
pub struct OperationQuery<'a> {
    pub name: &'a str,
    pub config_name: &'a str,
    pub change_type: ChangeType,
    pub direction: Direction,
}
