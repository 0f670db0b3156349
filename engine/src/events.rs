//! Lifecycle events emitted by the runner and changeset engine.
//!
//! Events are fire-and-forget notifications for whatever is observing a
//! run (a terminal UI, a log). The engine never reads anything back from a
//! sink, and results never depend on one.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use sqlrun_core::{BatchStatus, ChangeType, Direction, FileStatus, NeedsRunReason, SkipReason};
use tracing::{debug, info, warn};

/// A structured engine notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    BuildStart {
        name: String,
        change_type: ChangeType,
        operation_id: Option<i64>,
        file_count: usize,
    },
    BuildComplete {
        name: String,
        operation_id: Option<i64>,
        status: BatchStatus,
        files_run: usize,
        files_skipped: usize,
        files_failed: usize,
        duration_ms: u64,
    },
    FileBefore {
        filepath: String,
        reason: NeedsRunReason,
    },
    FileAfter {
        filepath: String,
        status: FileStatus,
        duration_ms: u64,
        error: Option<String>,
    },
    FileSkip {
        filepath: String,
        reason: SkipReason,
    },
    FileDryRun {
        filepath: String,
        output: PathBuf,
    },
    ChangeStart {
        name: String,
        direction: Direction,
    },
    ChangeComplete {
        name: String,
        direction: Direction,
        status: BatchStatus,
    },
    Error {
        context: String,
        message: String,
    },
}

impl Event {
    /// The wire name of the event, e.g. `file:before`.
    pub fn name(&self) -> &'static str {
        match self {
            Event::BuildStart { .. } => "build:start",
            Event::BuildComplete { .. } => "build:complete",
            Event::FileBefore { .. } => "file:before",
            Event::FileAfter { .. } => "file:after",
            Event::FileSkip { .. } => "file:skip",
            Event::FileDryRun { .. } => "file:dry-run",
            Event::ChangeStart { .. } => "change:start",
            Event::ChangeComplete { .. } => "change:complete",
            Event::Error { .. } => "error",
        }
    }
}

/// Receiver of engine events.
pub trait EventSink {
    fn emit(&self, event: &Event);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &Event) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::BuildStart {
                name,
                operation_id,
                file_count,
                ..
            } => info!(event = event.name(), %name, ?operation_id, file_count, "batch started"),
            Event::BuildComplete {
                name,
                status,
                files_run,
                files_skipped,
                files_failed,
                duration_ms,
                ..
            } => info!(
                event = event.name(),
                %name,
                status = status.as_str(),
                files_run,
                files_skipped,
                files_failed,
                duration_ms,
                "batch complete"
            ),
            Event::FileBefore { filepath, reason } => {
                debug!(event = event.name(), %filepath, reason = reason.as_str(), "running file")
            }
            Event::FileAfter {
                filepath,
                status,
                duration_ms,
                error,
            } => match error {
                Some(error) => warn!(event = event.name(), %filepath, %error, duration_ms, "file failed"),
                None => debug!(event = event.name(), %filepath, ?status, duration_ms, "file finished"),
            },
            Event::FileSkip { filepath, reason } => {
                debug!(event = event.name(), %filepath, reason = reason.as_str(), "file skipped")
            }
            Event::FileDryRun { filepath, output } => {
                debug!(event = event.name(), %filepath, output = %output.display(), "file rendered")
            }
            Event::ChangeStart { name, direction } => {
                info!(event = event.name(), %name, %direction, "changeset started")
            }
            Event::ChangeComplete {
                name,
                direction,
                status,
            } => info!(event = event.name(), %name, %direction, status = status.as_str(), "changeset complete"),
            Event::Error { context, message } => {
                warn!(event = event.name(), %context, %message, "engine error")
            }
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the events recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// The names of the events recorded so far.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(Event::name).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
