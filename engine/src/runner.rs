//! Batch execution: build, directory, explicit files, and single files.
//!
//! Every batch goes through the same pipeline. Files are planned in order
//! (path, ledger path, checksum of the raw bytes), then handled by one of
//! three modes:
//!
//! - **preview** renders each file and optionally writes all of them to
//!   one output file, with no execution and no ledger writes
//! - **dry-run** renders each file into a mirrored path under the tmp
//!   directory, again with no execution and no ledger writes
//! - **tracked execution** opens one operation, then per file asks the
//!   tracker whether it needs to run, renders it, executes it, and records
//!   the outcome
//!
//! Files always execute strictly in plan order. Cancellation is checked
//! between files only; a statement that has started runs to completion
//! unless the connection is interrupted, which surfaces as a failure of
//! kind [`FailureKind::Interrupted`].

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Local;
use sqlrun_core::{
    BatchResult, BatchStatus, ChangeType, Direction, ExecErrorKind, ExecutionStatus,
    ExecutionUpdate, FailureKind, FileResult, FileStatus, FileType, LedgerStore, NeedsRun,
    NeedsRunReason, NewExecution, OperationFinal, OperationStatus, PlannedFile, SkipReason,
    SqlExecutor,
};
use sqlrun_files::{
    ProjectConfig, RunnerConfig, combined_checksum, discover_files, file_checksum,
    strip_template_suffix,
};
use tracing::{debug, info, warn};

use crate::elapsed_ms;
use crate::error::{EngineError, Result};
use crate::events::{Event, EventSink, TracingSink};
use crate::identity::Identity;
use crate::template::{RenderContext, TemplateEngine, VarTemplates};
use crate::tracker::Tracker;

/// What a batch does with its files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Tracked execution against the database.
    #[default]
    Execute,
    /// Render into the tmp directory only.
    DryRun,
    /// Render in memory, optionally concatenated into `output`.
    Preview { output: Option<PathBuf> },
}

/// Per-call batch options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Run files even when the ledger says they are unchanged.
    pub force: bool,
    pub mode: RunMode,
    /// Stop at the first failed file.
    pub abort_on_error: bool,
    /// Insert pending rows for the whole batch before the first file runs.
    pub eager_records: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            mode: RunMode::Execute,
            abort_on_error: true,
            eager_records: true,
        }
    }
}

impl RunOptions {
    /// Defaults taken from the `runner` section of the config.
    pub fn from_config(runner: &RunnerConfig) -> Self {
        Self {
            abort_on_error: runner.abort_on_error,
            ..Self::default()
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Cooperative cancellation flag, checked between files.
///
/// Clones share the same flag, so a clone can be handed to a signal
/// handler while the runner keeps the original.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a runner needs from its caller.
///
/// The caller owns the connection behind `store` and `executor` and is
/// responsible for closing it after the batch, however the batch ends.
pub struct RunContext<'a> {
    /// Directory that ledger paths and config paths are relative to.
    pub project_root: PathBuf,
    pub config: &'a ProjectConfig,
    pub store: &'a dyn LedgerStore,
    pub executor: &'a dyn SqlExecutor,
    pub templates: &'a dyn TemplateEngine,
    pub events: &'a dyn EventSink,
    pub identity: Identity,
    pub cancel: CancelToken,
}

impl<'a> RunContext<'a> {
    /// A context with the bundled template engine, tracing events, and the
    /// identity resolved from config or environment.
    pub fn new(
        project_root: impl Into<PathBuf>,
        config: &'a ProjectConfig,
        store: &'a dyn LedgerStore,
        executor: &'a dyn SqlExecutor,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            config,
            store,
            executor,
            templates: &VarTemplates,
            events: &TracingSink,
            identity: Identity::resolve(config.identity.as_ref()),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_templates(mut self, templates: &'a dyn TemplateEngine) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_events(mut self, events: &'a dyn EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolves a path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.config.resolve(&self.project_root, path)
    }
}

/// One file of a planned batch.
pub(crate) struct PlannedEntry {
    pub(crate) path: PathBuf,
    pub(crate) filepath: String,
    pub(crate) file_type: FileType,
    /// Checksum of the raw file, or the read error.
    pub(crate) checksum: std::result::Result<String, String>,
}

impl PlannedEntry {
    fn checksum_or_empty(&self) -> String {
        self.checksum.clone().unwrap_or_default()
    }
}

/// A batch ready to run.
pub(crate) struct BatchPlan {
    pub(crate) name: String,
    pub(crate) change_type: ChangeType,
    pub(crate) direction: Direction,
    pub(crate) entries: Vec<PlannedEntry>,
    /// When set, every file runs for this reason and per-file history is
    /// not consulted (changesets are gated by name instead).
    pub(crate) unit_reason: Option<NeedsRunReason>,
}

impl BatchPlan {
    /// Combined checksum over every readable file, in plan order.
    pub(crate) fn checksum(&self) -> String {
        let digests: Vec<&str> = self
            .entries
            .iter()
            .filter_map(|e| e.checksum.as_deref().ok())
            .collect();
        combined_checksum(&digests)
    }
}

/// Runs batches of SQL files against one database.
///
/// # Examples
///
/// ```
/// use rusqlite::Connection;
/// use sqlrun_engine::{NullSink, RunContext, RunOptions, Runner};
/// use sqlrun_files::ProjectConfig;
/// use sqlrun_sqlite::{LedgerMigration, SqliteExecutor, SqliteLedger};
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::create_dir(dir.path().join("sql")).unwrap();
/// std::fs::write(dir.path().join("sql/001_users.sql"), "CREATE TABLE users (id INTEGER);").unwrap();
///
/// let config = ProjectConfig::new("dev", "dev.db");
/// let conn = Connection::open_in_memory().unwrap();
/// LedgerMigration::new(&conn, &config.ledger.prefix).unwrap().up().unwrap();
/// let ledger = SqliteLedger::new(&conn, &config.ledger.prefix).unwrap();
/// let exec = SqliteExecutor::new(&conn);
///
/// let runner = Runner::new(RunContext::new(dir.path(), &config, &ledger, &exec).with_events(&NullSink));
/// let first = runner.build(&RunOptions::default()).unwrap();
/// assert_eq!(first.files_run, 1);
///
/// let second = runner.build(&RunOptions::default()).unwrap();
/// assert_eq!(second.files_skipped, 1);
/// ```
pub struct Runner<'a> {
    ctx: RunContext<'a>,
    tracker: Tracker<'a>,
}

impl<'a> Runner<'a> {
    pub fn new(ctx: RunContext<'a>) -> Self {
        let tracker = Tracker::new(ctx.store, ctx.events, ctx.config.name.clone())
            .strict(ctx.config.runner.strict_ledger);
        if ctx.config.runner.concurrency > 1 {
            warn!(
                concurrency = ctx.config.runner.concurrency,
                "files always run sequentially; runner.concurrency is ignored"
            );
        }
        Self { ctx, tracker }
    }

    pub fn tracker(&self) -> &Tracker<'a> {
        &self.tracker
    }

    pub fn context(&self) -> &RunContext<'a> {
        &self.ctx
    }

    /// Runs every file in the configured sql directory as a build.
    pub fn build(&self, opts: &RunOptions) -> Result<BatchResult> {
        let dir = self.ctx.resolve(&self.ctx.config.paths.sql);
        let files = discover_files(&dir)?;
        let name = format!("build {}", Local::now().format("%Y-%m-%dT%H:%M:%S"));
        let plan = self.plan(name, ChangeType::Build, Direction::Commit, files);
        self.execute_batch(&plan, opts)
    }

    /// Runs every file under `dir`, in discovery order.
    pub fn run_dir(&self, dir: &Path, opts: &RunOptions) -> Result<BatchResult> {
        let dir = self.ctx.resolve(dir);
        let files = discover_files(&dir)?;
        let name = format!("run {}", ledger_path(&self.ctx.project_root, &dir));
        let plan = self.plan(name, ChangeType::Run, Direction::Commit, files);
        self.execute_batch(&plan, opts)
    }

    /// Runs the given files in the given order.
    pub fn run_files(&self, files: &[PathBuf], opts: &RunOptions) -> Result<BatchResult> {
        let name = match files {
            [single] => format!("run {}", ledger_path(&self.ctx.project_root, single)),
            _ => format!("run {} files", files.len()),
        };
        let plan = self.plan(name, ChangeType::Run, Direction::Commit, files.to_vec());
        self.execute_batch(&plan, opts)
    }

    /// Runs one file as its own tracked operation.
    pub fn run_file(&self, file: &Path, force: bool) -> Result<BatchResult> {
        let plan = self.plan(
            ledger_path(&self.ctx.project_root, &self.ctx.resolve(file)),
            ChangeType::Run,
            Direction::Commit,
            vec![file.to_path_buf()],
        );
        let opts = RunOptions {
            force,
            eager_records: false,
            ..RunOptions::default()
        };
        self.execute_batch(&plan, &opts)
    }

    pub(crate) fn plan(
        &self,
        name: String,
        change_type: ChangeType,
        direction: Direction,
        files: Vec<PathBuf>,
    ) -> BatchPlan {
        let entries = files
            .into_iter()
            .map(|file| {
                let path = self.ctx.resolve(&file);
                let file_type = if self.ctx.templates.is_template(&path) {
                    FileType::Template
                } else {
                    FileType::Sql
                };
                PlannedEntry {
                    filepath: ledger_path(&self.ctx.project_root, &path),
                    file_type,
                    checksum: file_checksum(&path).map_err(|e| e.to_string()),
                    path,
                }
            })
            .collect();
        BatchPlan {
            name,
            change_type,
            direction,
            entries,
            unit_reason: None,
        }
    }

    pub(crate) fn execute_batch(&self, plan: &BatchPlan, opts: &RunOptions) -> Result<BatchResult> {
        let started = Instant::now();
        debug!(name = %plan.name, files = plan.entries.len(), mode = ?opts.mode, "executing batch");
        match &opts.mode {
            RunMode::Preview { output } => self.preview(plan, output.as_deref(), started),
            RunMode::DryRun => self.dry_run(plan, started),
            RunMode::Execute => self.execute_tracked(plan, opts, started),
        }
    }

    fn preview(&self, plan: &BatchPlan, output: Option<&Path>, started: Instant) -> Result<BatchResult> {
        self.emit_start(plan, None);
        let mut combined = String::new();
        let files: Vec<FileResult> = plan
            .entries
            .iter()
            .map(|entry| match self.render(entry) {
                Ok(sql) => {
                    combined.push_str(&format!("-- File: {}\n{}\n\n", entry.filepath, sql.trim_end()));
                    rendered(entry, sql)
                }
                Err((kind, message)) => failed(entry, kind, message, None),
            })
            .collect();

        if let Some(output) = output {
            let output = self.ctx.resolve(output);
            write_file(&output, &combined)?;
            info!(output = %output.display(), "preview written");
        }

        let result = BatchResult::from_files(files, elapsed_ms(started), None, plan.checksum());
        self.emit_complete(plan, &result);
        Ok(result)
    }

    fn dry_run(&self, plan: &BatchPlan, started: Instant) -> Result<BatchResult> {
        self.emit_start(plan, None);
        let tmp = self.ctx.resolve(&self.ctx.config.paths.tmp);
        let mut files = Vec::with_capacity(plan.entries.len());
        for entry in &plan.entries {
            match self.render(entry) {
                Ok(sql) => {
                    let target = tmp.join(strip_template_suffix(&mirrored(&entry.filepath)));
                    write_file(&target, &sql)?;
                    self.ctx.events.emit(&Event::FileDryRun {
                        filepath: entry.filepath.clone(),
                        output: target,
                    });
                    files.push(rendered(entry, sql));
                }
                Err((kind, message)) => files.push(failed(entry, kind, message, None)),
            }
        }

        let result = BatchResult::from_files(files, elapsed_ms(started), None, plan.checksum());
        self.emit_complete(plan, &result);
        Ok(result)
    }

    fn execute_tracked(&self, plan: &BatchPlan, opts: &RunOptions, started: Instant) -> Result<BatchResult> {
        let operation_id = self.tracker.create_operation(
            &plan.name,
            plan.change_type,
            plan.direction,
            &self.ctx.identity.to_string(),
        )?;
        self.emit_start(plan, Some(operation_id));

        let files = match self.run_entries(plan, opts, operation_id) {
            Ok(files) => files,
            Err(err) => {
                let outcome = OperationFinal {
                    status: OperationStatus::Failed,
                    duration_ms: elapsed_ms(started),
                    checksum: None,
                    error_message: Some(err.to_string()),
                };
                if let Err(close) = self.tracker.finalize_operation(operation_id, &outcome) {
                    warn!(operation_id, error = %close, "could not close aborted operation");
                }
                return Err(err);
            }
        };

        let checksum = plan.checksum();
        let mut result =
            BatchResult::from_files(files, elapsed_ms(started), Some(operation_id), checksum.clone());

        let cancelled = result
            .files
            .iter()
            .any(|f| f.skip_reason == Some(SkipReason::Cancelled));
        if cancelled && result.status == BatchStatus::Success {
            result.status = if result.files_run > 0 {
                BatchStatus::Partial
            } else {
                BatchStatus::Failed
            };
        }

        let succeeded = result.files_failed == 0 && !cancelled;
        let outcome = OperationFinal {
            status: if succeeded {
                OperationStatus::Success
            } else {
                OperationStatus::Failed
            },
            duration_ms: result.duration_ms,
            checksum: Some(checksum),
            error_message: result
                .first_error()
                .map(str::to_string)
                .or_else(|| cancelled.then(|| "cancelled".to_string())),
        };
        self.tracker
            .absorb(self.tracker.finalize_operation(operation_id, &outcome))?;

        self.emit_complete(plan, &result);
        Ok(result)
    }

    fn run_entries(&self, plan: &BatchPlan, opts: &RunOptions, operation_id: i64) -> Result<Vec<FileResult>> {
        if opts.eager_records {
            let planned: Vec<PlannedFile> = plan
                .entries
                .iter()
                .map(|e| PlannedFile {
                    filepath: e.filepath.clone(),
                    file_type: e.file_type,
                    checksum: e.checksum_or_empty(),
                })
                .collect();
            self.tracker
                .absorb(self.tracker.create_file_records(operation_id, &planned))?;
        }

        let mut files = Vec::with_capacity(plan.entries.len());
        let mut stopped: Option<SkipReason> = None;
        for entry in &plan.entries {
            if stopped.is_none() && self.ctx.cancel.is_cancelled() {
                info!(name = %plan.name, "cancellation requested; skipping remaining files");
                stopped = Some(SkipReason::Cancelled);
            }
            if let Some(reason) = stopped {
                files.push(self.skip_entry(operation_id, opts, entry, reason)?);
                continue;
            }

            let result = self.run_entry(plan, opts, operation_id, entry)?;
            let file_failed = result.status == FileStatus::Failed;
            files.push(result);
            if file_failed && opts.abort_on_error {
                info!(name = %plan.name, file = %entry.filepath, "aborting batch after failure");
                stopped = Some(SkipReason::BatchAborted);
            }
        }

        if let (true, Some(reason)) = (opts.eager_records, stopped) {
            self.tracker
                .absorb(self.tracker.skip_remaining_files(operation_id, reason))?;
        }
        Ok(files)
    }

    fn run_entry(
        &self,
        plan: &BatchPlan,
        opts: &RunOptions,
        operation_id: i64,
        entry: &PlannedEntry,
    ) -> Result<FileResult> {
        let checksum = match &entry.checksum {
            Ok(checksum) => checksum.clone(),
            Err(message) => {
                let result = failed(entry, FailureKind::Io, message.clone(), Some(0));
                self.finish(operation_id, opts, entry, &result)?;
                return Ok(result);
            }
        };

        let reason = match plan.unit_reason {
            Some(reason) => reason,
            None => match self
                .tracker
                .needs_run_within(operation_id, &entry.filepath, &checksum, opts.force)
            {
                NeedsRun::Run { reason, .. } => reason,
                NeedsRun::Skip { reason, .. } => {
                    let result = FileResult::skipped(entry.filepath.clone(), checksum, reason);
                    self.ctx.events.emit(&Event::FileSkip {
                        filepath: entry.filepath.clone(),
                        reason,
                    });
                    self.finish(operation_id, opts, entry, &result)?;
                    return Ok(result);
                }
            },
        };

        self.ctx.events.emit(&Event::FileBefore {
            filepath: entry.filepath.clone(),
            reason,
        });
        let started = Instant::now();
        let outcome = self.load_sql(entry).and_then(|sql| {
            self.ctx.executor.execute_raw(&sql).map_err(|err| match err.kind {
                ExecErrorKind::Sql => (FailureKind::Sql, err.message),
                ExecErrorKind::Interrupted => {
                    (FailureKind::Interrupted, format!("interrupted: {}", err.message))
                }
            })
        });
        let duration_ms = elapsed_ms(started);

        let mut result = match outcome {
            Ok(()) => FileResult {
                filepath: entry.filepath.clone(),
                checksum,
                status: FileStatus::Success,
                reason: None,
                error: None,
                failure: None,
                skip_reason: None,
                rendered_sql: None,
                duration_ms: Some(duration_ms),
            },
            Err((kind, message)) => failed(entry, kind, message, Some(duration_ms)),
        };
        result.reason = Some(reason);

        self.ctx.events.emit(&Event::FileAfter {
            filepath: entry.filepath.clone(),
            status: result.status,
            duration_ms,
            error: result.error.clone(),
        });
        self.finish(operation_id, opts, entry, &result)?;
        Ok(result)
    }

    fn skip_entry(
        &self,
        operation_id: i64,
        opts: &RunOptions,
        entry: &PlannedEntry,
        reason: SkipReason,
    ) -> Result<FileResult> {
        self.ctx.events.emit(&Event::FileSkip {
            filepath: entry.filepath.clone(),
            reason,
        });
        let result = FileResult::skipped(entry.filepath.clone(), entry.checksum_or_empty(), reason);
        // Eager rows stay pending here and are skipped in bulk afterwards.
        if !opts.eager_records {
            self.finish(operation_id, opts, entry, &result)?;
        }
        Ok(result)
    }

    /// Writes a file's outcome to the ledger.
    fn finish(
        &self,
        operation_id: i64,
        opts: &RunOptions,
        entry: &PlannedEntry,
        result: &FileResult,
    ) -> Result<()> {
        let status = match result.status {
            FileStatus::Success => ExecutionStatus::Success,
            FileStatus::Failed => ExecutionStatus::Failed,
            FileStatus::Skipped | FileStatus::Rendered => ExecutionStatus::Skipped,
        };

        if opts.eager_records {
            let update = ExecutionUpdate {
                status,
                duration_ms: result.duration_ms,
                error_message: result.error.clone(),
                skip_reason: result.skip_reason,
            };
            self.tracker.absorb(self.tracker.update_file_execution(
                operation_id,
                &entry.filepath,
                &update,
            ))
        } else {
            self.tracker.record_execution(&NewExecution {
                change_id: operation_id,
                filepath: entry.filepath.clone(),
                file_type: entry.file_type,
                checksum: result.checksum.clone(),
                status,
                skip_reason: result.skip_reason,
                error_message: result.error.clone(),
                duration_ms: result.duration_ms,
            })
        }
    }

    fn render(&self, entry: &PlannedEntry) -> std::result::Result<String, (FailureKind, String)> {
        if let Err(message) = &entry.checksum {
            return Err((FailureKind::Io, message.clone()));
        }
        self.load_sql(entry)
    }

    /// Reads a plain file or renders a template.
    fn load_sql(&self, entry: &PlannedEntry) -> std::result::Result<String, (FailureKind, String)> {
        match entry.file_type {
            FileType::Template => {
                let ctx = RenderContext::new(&self.ctx.project_root, self.ctx.config);
                self.ctx
                    .templates
                    .process_file(&entry.path, &ctx)
                    .map(|r| r.sql)
                    .map_err(|e| (FailureKind::Template, e.to_string()))
            }
            FileType::Sql => std::fs::read_to_string(&entry.path).map_err(|e| {
                (
                    FailureKind::Io,
                    format!("cannot read file '{}': {e}", entry.path.display()),
                )
            }),
        }
    }

    fn emit_start(&self, plan: &BatchPlan, operation_id: Option<i64>) {
        if plan.change_type == ChangeType::Change {
            return;
        }
        self.ctx.events.emit(&Event::BuildStart {
            name: plan.name.clone(),
            change_type: plan.change_type,
            operation_id,
            file_count: plan.entries.len(),
        });
    }

    fn emit_complete(&self, plan: &BatchPlan, result: &BatchResult) {
        if plan.change_type == ChangeType::Change {
            return;
        }
        self.ctx.events.emit(&Event::BuildComplete {
            name: plan.name.clone(),
            operation_id: result.operation_id,
            status: result.status,
            files_run: result.files_run,
            files_skipped: result.files_skipped,
            files_failed: result.files_failed,
            duration_ms: result.duration_ms,
        });
    }
}

fn rendered(entry: &PlannedEntry, sql: String) -> FileResult {
    FileResult {
        filepath: entry.filepath.clone(),
        checksum: entry.checksum_or_empty(),
        status: FileStatus::Rendered,
        reason: None,
        error: None,
        failure: None,
        skip_reason: None,
        rendered_sql: Some(sql),
        duration_ms: None,
    }
}

fn failed(entry: &PlannedEntry, kind: FailureKind, message: String, duration_ms: Option<u64>) -> FileResult {
    FileResult {
        filepath: entry.filepath.clone(),
        checksum: entry.checksum_or_empty(),
        status: FileStatus::Failed,
        reason: None,
        error: Some(message),
        failure: Some(kind),
        skip_reason: None,
        rendered_sql: None,
        duration_ms,
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    let io = |source| EngineError::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    std::fs::write(path, contents).map_err(io)
}

/// Path recorded in the ledger: relative to the project root, with
/// forward slashes. Files outside the root keep their full path.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sqlrun_engine::ledger_path;
///
/// let root = Path::new("/srv/app");
/// assert_eq!(ledger_path(root, Path::new("/srv/app/sql/./001.sql")), "sql/001.sql");
/// assert_eq!(ledger_path(root, Path::new("/elsewhere/x.sql")), "/elsewhere/x.sql");
/// ```
pub fn ledger_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut out = String::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::RootDir => out.push('/'),
            Component::Prefix(prefix) => out.push_str(&prefix.as_os_str().to_string_lossy()),
            Component::ParentDir | Component::Normal(_) => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&component.as_os_str().to_string_lossy());
            }
        }
    }
    out
}

/// Relative form of a ledger path, safe to join under another directory.
fn mirrored(filepath: &str) -> PathBuf {
    Path::new(filepath)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}
