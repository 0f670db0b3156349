//! Outcomes returned to callers of the runner and changeset engine.

use serde::Serialize;

use crate::types::{NeedsRunReason, SkipReason};

/// Outcome of one file within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    Success,
    Failed,
    Skipped,
    /// Rendered only (preview or dry-run); nothing was executed.
    Rendered,
}

/// Why a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The file could not be read or its checksum computed.
    Io,
    /// Template rendering failed.
    Template,
    /// The database rejected the SQL.
    Sql,
    /// The statement was interrupted or the connection closed mid-flight.
    Interrupted,
}

/// Overall outcome of a batch.
///
/// The persisted operation status is binary; `Partial` only exists here so
/// callers can tell "nothing worked" from "some files worked".
///
/// # Examples
///
/// ```
/// use sqlrun_core::BatchStatus;
///
/// assert_eq!(BatchStatus::from_counts(3, 0), BatchStatus::Success);
/// assert_eq!(BatchStatus::from_counts(1, 1), BatchStatus::Partial);
/// assert_eq!(BatchStatus::from_counts(0, 1), BatchStatus::Failed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Partial,
    Failed,
}

impl BatchStatus {
    pub fn from_counts(files_run: usize, files_failed: usize) -> Self {
        match (files_run, files_failed) {
            (_, 0) => BatchStatus::Success,
            (0, _) => BatchStatus::Failed,
            _ => BatchStatus::Partial,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Success => "success",
            BatchStatus::Partial => "partial",
            BatchStatus::Failed => "failed",
        }
    }
}

/// Per-file result enumerated in every [`BatchResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileResult {
    /// Path as recorded in the ledger (relative to the project root).
    pub filepath: String,
    /// Checksum of the raw file; empty when the file could not be read.
    pub checksum: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NeedsRunReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl FileResult {
    pub fn skipped(filepath: String, checksum: String, reason: SkipReason) -> Self {
        Self {
            filepath,
            checksum,
            status: FileStatus::Skipped,
            reason: None,
            error: None,
            failure: None,
            skip_reason: Some(reason),
            rendered_sql: None,
            duration_ms: None,
        }
    }
}

/// Result of a batch run (build, directory, explicit files, changeset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub status: BatchStatus,
    pub files: Vec<FileResult>,
    pub files_run: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub duration_ms: u64,
    /// Ledger operation id; `None` for preview and dry-run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<i64>,
    /// Combined checksum over the batch's file checksums.
    pub checksum: String,
}

impl BatchResult {
    /// Builds a result from per-file outcomes, deriving the counters.
    pub fn from_files(
        files: Vec<FileResult>,
        duration_ms: u64,
        operation_id: Option<i64>,
        checksum: String,
    ) -> Self {
        let files_run = files
            .iter()
            .filter(|f| f.status == FileStatus::Success)
            .count();
        let files_failed = files
            .iter()
            .filter(|f| f.status == FileStatus::Failed)
            .count();
        let files_skipped = files
            .iter()
            .filter(|f| f.status == FileStatus::Skipped)
            .count();
        Self {
            status: BatchStatus::from_counts(files_run, files_failed),
            files,
            files_run,
            files_skipped,
            files_failed,
            duration_ms,
            operation_id,
            checksum,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Success
    }

    /// The first failure message in execution order, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.files.iter().find_map(|f| f.error.as_deref())
    }
}
