//! Integration tests for sqlrun-engine against an in-memory SQLite ledger.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use sqlrun_core::{
    BatchStatus, ExecError, ExecutionStatus, FailureKind, FileStatus, NeedsRunReason,
    OperationStatus, SkipReason, SqlExecutor,
};
use sqlrun_engine::{
    CancelToken, ChangesetEngine, ChangesetStatus, EngineError, EventSink, NullSink, RecordingSink,
    RunContext, RunMode, RunOptions, Runner,
};
use sqlrun_files::ProjectConfig;
use sqlrun_sqlite::{LedgerMigration, SqliteExecutor, SqliteLedger};
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

struct Project {
    dir: TempDir,
    config: ProjectConfig,
    conn: Connection,
}

impl Project {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProjectConfig::new("dev", "dev.db");
        config.vars.insert("table".into(), "widgets".into());
        let conn = Connection::open_in_memory().unwrap();
        LedgerMigration::new(&conn, &config.ledger.prefix)
            .unwrap()
            .up()
            .unwrap();
        let project = Self { dir, config, conn };
        for (path, sql) in files {
            project.write(path, sql);
        }
        project
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, rel: &str, sql: &str) {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, sql).unwrap();
    }

    fn with_runner<R>(&self, events: &dyn EventSink, f: impl FnOnce(&Runner<'_>) -> R) -> R {
        let ledger = SqliteLedger::new(&self.conn, &self.config.ledger.prefix).unwrap();
        let exec = SqliteExecutor::new(&self.conn);
        let runner =
            Runner::new(RunContext::new(self.root(), &self.config, &ledger, &exec).with_events(events));
        f(&runner)
    }

    fn build(&self, opts: &RunOptions) -> sqlrun_core::BatchResult {
        self.with_runner(&NullSink, |runner| runner.build(opts).unwrap())
    }

    fn table_exists(&self, name: &str) -> bool {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get::<_, i64>(0),
            )
            .unwrap()
            > 0
    }
}

fn reasons(result: &sqlrun_core::BatchResult) -> Vec<Option<NeedsRunReason>> {
    result.files.iter().map(|f| f.reason).collect()
}

const USERS: &str = "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY);";
const ORDERS: &str = "CREATE TABLE IF NOT EXISTS orders (id INTEGER PRIMARY KEY);";
const BROKEN: &str = "INSERT INTO no_such_table VALUES (1);";

// ============================================================================
// Build idempotency and change detection
// ============================================================================

#[test]
fn test_build_is_idempotent_across_runs() {
    let project = Project::new(&[("sql/001_users.sql", USERS), ("sql/002_orders.sql", ORDERS)]);
    let opts = RunOptions::default();

    let first = project.build(&opts);
    assert_eq!(first.status, BatchStatus::Success);
    assert_eq!(first.files_run, 2);
    assert_eq!(reasons(&first), vec![Some(NeedsRunReason::New); 2]);

    for _ in 0..2 {
        let again = project.build(&opts);
        assert_eq!(again.files_run, 0);
        assert_eq!(again.files_skipped, 2);
        assert!(again
            .files
            .iter()
            .all(|f| f.skip_reason == Some(SkipReason::Unchanged)));
        assert!(again.is_success());
    }
    assert!(project.table_exists("users"));
}

#[test]
fn test_changed_file_reruns_alone() {
    let project = Project::new(&[("sql/001_users.sql", USERS), ("sql/002_orders.sql", ORDERS)]);
    project.build(&RunOptions::default());

    project.write(
        "sql/002_orders.sql",
        "CREATE TABLE IF NOT EXISTS orders (id INTEGER PRIMARY KEY, total INTEGER);",
    );
    let result = project.build(&RunOptions::default());
    assert_eq!(result.files_run, 1);
    assert_eq!(result.files[0].skip_reason, Some(SkipReason::Unchanged));
    assert_eq!(result.files[1].reason, Some(NeedsRunReason::Changed));
}

#[test]
fn test_force_reruns_everything() {
    let project = Project::new(&[("sql/001_users.sql", USERS)]);
    project.build(&RunOptions::default());

    let forced = project.build(&RunOptions::default().with_force(true));
    assert_eq!(forced.files_run, 1);
    assert_eq!(forced.files[0].reason, Some(NeedsRunReason::Force));
}

#[test]
fn test_mark_stale_reruns_with_stale_reason() {
    let project = Project::new(&[("sql/001_users.sql", USERS)]);
    project.build(&RunOptions::default());

    let result = project.with_runner(&NullSink, |runner| {
        assert_eq!(runner.tracker().mark_stale().unwrap(), 1);
        runner.build(&RunOptions::default()).unwrap()
    });
    assert_eq!(result.files_run, 1);
    assert_eq!(result.files[0].reason, Some(NeedsRunReason::Stale));
}

// ============================================================================
// Failure handling
// ============================================================================

#[test]
fn test_abort_on_error_skips_rest_of_batch() {
    let project = Project::new(&[
        ("sql/001_users.sql", USERS),
        ("sql/002_broken.sql", BROKEN),
        ("sql/003_orders.sql", ORDERS),
    ]);

    let result = project.build(&RunOptions::default());
    assert_eq!(result.status, BatchStatus::Partial);
    assert_eq!((result.files_run, result.files_failed, result.files_skipped), (1, 1, 1));
    assert_eq!(result.files[1].failure, Some(FailureKind::Sql));
    assert!(result.files[1].error.as_deref().unwrap().contains("no_such_table"));
    assert_eq!(result.files[2].skip_reason, Some(SkipReason::BatchAborted));
    assert!(!project.table_exists("orders"));

    let op_id = result.operation_id.unwrap();
    let (op, rows) = project.with_runner(&NullSink, |runner| {
        let tracker = runner.tracker();
        let op = tracker.operations().unwrap().pop().unwrap();
        (op, tracker.executions(op_id).unwrap())
    });
    assert_eq!(op.status, OperationStatus::Failed);
    assert!(op.error_message.unwrap().contains("no_such_table"));
    let statuses: Vec<ExecutionStatus> = rows.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![ExecutionStatus::Success, ExecutionStatus::Failed, ExecutionStatus::Skipped]
    );
    assert_eq!(rows[2].skip_reason, Some(SkipReason::BatchAborted));

    // Fixing the broken file retries it and runs what was skipped.
    project.write("sql/002_broken.sql", "CREATE TABLE IF NOT EXISTS no_such_table (v INTEGER);");
    let retry = project.build(&RunOptions::default());
    assert_eq!(
        reasons(&retry),
        vec![None, Some(NeedsRunReason::Failed), Some(NeedsRunReason::New)]
    );
    assert!(retry.is_success());
}

#[test]
fn test_failed_file_is_retried_even_when_unchanged() {
    let project = Project::new(&[("sql/001_broken.sql", BROKEN)]);
    let first = project.build(&RunOptions::default());
    assert_eq!(first.status, BatchStatus::Failed);

    project
        .conn
        .execute_batch("CREATE TABLE no_such_table (v INTEGER);")
        .unwrap();
    let retry = project.build(&RunOptions::default());
    assert_eq!(retry.files[0].reason, Some(NeedsRunReason::Failed));
    assert!(retry.is_success());
}

#[test]
fn test_continue_on_error_runs_remaining_files() {
    let project = Project::new(&[
        ("sql/001_users.sql", USERS),
        ("sql/002_broken.sql", BROKEN),
        ("sql/003_orders.sql", ORDERS),
    ]);
    let opts = RunOptions {
        abort_on_error: false,
        ..RunOptions::default()
    };

    let result = project.build(&opts);
    assert_eq!((result.files_run, result.files_failed, result.files_skipped), (2, 1, 0));
    assert_eq!(result.status, BatchStatus::Partial);
    assert!(project.table_exists("orders"));
}

#[test]
fn test_template_errors_fail_the_file() {
    let project = Project::new(&[("sql/001_bad.sql.tmpl", "CREATE TABLE {{ nope }} (id INTEGER);")]);
    let result = project.build(&RunOptions::default());
    assert_eq!(result.files_failed, 1);
    assert_eq!(result.files[0].failure, Some(FailureKind::Template));
    assert!(result.files[0].error.as_deref().unwrap().contains("nope"));
}

#[test]
fn test_missing_explicit_file_fails_as_io() {
    let project = Project::new(&[("sql/001_users.sql", USERS)]);
    let files = vec![PathBuf::from("sql/404.sql"), PathBuf::from("sql/001_users.sql")];
    let opts = RunOptions {
        abort_on_error: false,
        ..RunOptions::default()
    };

    let result = project.with_runner(&NullSink, |runner| runner.run_files(&files, &opts).unwrap());
    assert_eq!(result.files[0].failure, Some(FailureKind::Io));
    assert_eq!(result.files[0].checksum, "");
    assert_eq!(result.files[1].status, FileStatus::Success);
}

// ============================================================================
// Ordering and run variants
// ============================================================================

#[test]
fn test_explicit_files_run_in_given_order() {
    let project = Project::new(&[
        ("sql/a_create.sql", "CREATE TABLE log (n INTEGER);"),
        ("sql/b_insert.sql", "INSERT INTO log VALUES (1);"),
    ]);
    let files = vec![PathBuf::from("sql/b_insert.sql"), PathBuf::from("sql/a_create.sql")];

    let result = project.with_runner(&NullSink, |runner| {
        runner.run_files(&files, &RunOptions::default()).unwrap()
    });
    assert_eq!(result.files[0].filepath, "sql/b_insert.sql");
    assert_eq!(result.files[0].status, FileStatus::Failed);
    assert_eq!(result.files[1].skip_reason, Some(SkipReason::BatchAborted));
}

#[test]
fn test_build_runs_nested_files_in_path_order() {
    let project = Project::new(&[
        ("sql/01_schema/001_log.sql", "CREATE TABLE log (n INTEGER);"),
        ("sql/02_data/001_one.sql", "INSERT INTO log VALUES (1);"),
        ("sql/02_data/002_two.sql", "INSERT INTO log VALUES (2);"),
    ]);
    let result = project.build(&RunOptions::default());
    assert!(result.is_success());

    let order: String = project
        .conn
        .query_row("SELECT group_concat(n, ',') FROM (SELECT n FROM log ORDER BY rowid)", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(order, "1,2");
}

#[test]
fn test_run_file_shares_history_with_build() {
    let project = Project::new(&[("sql/001_users.sql", USERS)]);
    let single = project.with_runner(&NullSink, |runner| {
        runner.run_file(Path::new("sql/001_users.sql"), false).unwrap()
    });
    assert_eq!(single.files_run, 1);

    let rows = project.with_runner(&NullSink, |runner| {
        runner.tracker().executions(single.operation_id.unwrap()).unwrap()
    });
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].filepath, "sql/001_users.sql");

    let build = project.build(&RunOptions::default());
    assert_eq!(build.files[0].skip_reason, Some(SkipReason::Unchanged));
}

#[test]
fn test_run_file_twice_skips_second_time() {
    let project = Project::new(&[("sql/001_users.sql", "CREATE TABLE users (id INTEGER);")]);
    let (first, second) = project.with_runner(&NullSink, |runner| {
        let file = Path::new("sql/001_users.sql");
        (runner.run_file(file, false).unwrap(), runner.run_file(file, false).unwrap())
    });
    assert_eq!(first.files[0].status, FileStatus::Success);
    assert_eq!(second.files[0].status, FileStatus::Skipped);
    assert_eq!(second.files[0].skip_reason, Some(SkipReason::Unchanged));
}

#[test]
fn test_run_dir_limits_to_directory() {
    let project = Project::new(&[
        ("sql/core/001_users.sql", USERS),
        ("sql/extra/001_orders.sql", ORDERS),
    ]);
    let result = project.with_runner(&NullSink, |runner| {
        runner.run_dir(Path::new("sql/extra"), &RunOptions::default()).unwrap()
    });
    assert_eq!(result.files.len(), 1);
    assert!(project.table_exists("orders"));
    assert!(!project.table_exists("users"));
}

#[test]
fn test_lazy_records_written_per_file() {
    let project = Project::new(&[
        ("sql/001_broken.sql", BROKEN),
        ("sql/002_users.sql", USERS),
    ]);
    let opts = RunOptions {
        eager_records: false,
        ..RunOptions::default()
    };

    let result = project.build(&opts);
    let rows = project.with_runner(&NullSink, |runner| {
        runner.tracker().executions(result.operation_id.unwrap()).unwrap()
    });
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].status, ExecutionStatus::Failed);
    assert_eq!(rows[1].skip_reason, Some(SkipReason::BatchAborted));
}

#[test]
fn test_cancel_before_start_skips_everything() {
    let project = Project::new(&[("sql/001_users.sql", USERS)]);
    let token = CancelToken::new();
    token.cancel();

    let ledger = SqliteLedger::new(&project.conn, &project.config.ledger.prefix).unwrap();
    let exec = SqliteExecutor::new(&project.conn);
    let runner = Runner::new(
        RunContext::new(project.root(), &project.config, &ledger, &exec)
            .with_events(&NullSink)
            .with_cancel_token(token),
    );

    let result = runner.build(&RunOptions::default()).unwrap();
    assert_eq!(result.status, BatchStatus::Failed);
    assert_eq!(result.files[0].skip_reason, Some(SkipReason::Cancelled));
    assert!(!project.table_exists("users"));

    let op = runner.tracker().operations().unwrap().pop().unwrap();
    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.error_message.as_deref(), Some("cancelled"));
}

/// Executes normally until it sees `trigger`, then reports an interrupted
/// statement and cancels the batch.
struct InterruptingExecutor<'a> {
    inner: SqliteExecutor<'a>,
    trigger: &'static str,
    token: CancelToken,
}

impl SqlExecutor for InterruptingExecutor<'_> {
    fn execute_raw(&self, sql: &str) -> Result<(), ExecError> {
        if sql.contains(self.trigger) {
            self.token.cancel();
            return Err(ExecError::interrupted("conn closed"));
        }
        self.inner.execute_raw(sql)
    }
}

#[test]
fn test_interrupt_then_cancel_mid_batch() {
    let project = Project::new(&[
        ("sql/001_users.sql", USERS),
        ("sql/002_slow.sql", "CREATE TABLE slow (id INTEGER);"),
        ("sql/003_orders.sql", ORDERS),
    ]);
    let token = CancelToken::new();

    let ledger = SqliteLedger::new(&project.conn, &project.config.ledger.prefix).unwrap();
    let exec = InterruptingExecutor {
        inner: SqliteExecutor::new(&project.conn),
        trigger: "slow",
        token: token.clone(),
    };
    let runner = Runner::new(
        RunContext::new(project.root(), &project.config, &ledger, &exec)
            .with_events(&NullSink)
            .with_cancel_token(token),
    );
    let opts = RunOptions {
        abort_on_error: false,
        ..RunOptions::default()
    };

    let result = runner.build(&opts).unwrap();
    assert_eq!(result.status, BatchStatus::Partial);
    assert_eq!(
        (result.files_run, result.files_failed, result.files_skipped),
        (1, 1, 1)
    );
    assert_eq!(result.files[0].status, FileStatus::Success);
    assert_eq!(result.files[1].status, FileStatus::Failed);
    assert_eq!(result.files[1].failure, Some(FailureKind::Interrupted));
    assert_eq!(result.files[1].error.as_deref(), Some("interrupted: conn closed"));
    assert_eq!(result.files[2].skip_reason, Some(SkipReason::Cancelled));
    assert!(project.table_exists("users"));
    assert!(!project.table_exists("orders"));

    let op_id = result.operation_id.unwrap();
    let op = runner.tracker().operations().unwrap().pop().unwrap();
    assert_eq!(op.id, op_id);
    assert_eq!(op.status, OperationStatus::Failed);
    let rows = runner.tracker().executions(op_id).unwrap();
    assert_eq!(rows[1].status, ExecutionStatus::Failed);
    assert_eq!(rows[2].status, ExecutionStatus::Skipped);
    assert_eq!(rows[2].skip_reason, Some(SkipReason::Cancelled));
}

// ============================================================================
// Dry-run and preview
// ============================================================================

#[test]
fn test_dry_run_renders_into_tmp_without_ledger_writes() {
    let project = Project::new(&[
        ("sql/001_users.sql", USERS),
        ("sql/002_widgets.sql.tmpl", "CREATE TABLE {{ table }} (id INTEGER);"),
    ]);
    let opts = RunOptions::default().with_mode(RunMode::DryRun);

    let result = project.build(&opts);
    assert!(result.operation_id.is_none());
    assert!(result.files.iter().all(|f| f.status == FileStatus::Rendered));

    let rendered = std::fs::read_to_string(project.root().join("tmp/sql/002_widgets.sql")).unwrap();
    assert_eq!(rendered, "CREATE TABLE widgets (id INTEGER);");
    assert!(project.root().join("tmp/sql/001_users.sql").exists());
    assert!(!project.table_exists("widgets"));
    let ops = project.with_runner(&NullSink, |runner| runner.tracker().operations().unwrap());
    assert!(ops.is_empty());
}

#[test]
fn test_preview_concatenates_rendered_files() {
    let project = Project::new(&[
        ("sql/001_users.sql", USERS),
        ("sql/002_widgets.sql.tmpl", "CREATE TABLE {{ table }} (id INTEGER);\n"),
    ]);
    let opts = RunOptions::default().with_mode(RunMode::Preview {
        output: Some(PathBuf::from("out/preview.sql")),
    });

    let result = project.build(&opts);
    assert_eq!(
        result.files[1].rendered_sql.as_deref(),
        Some("CREATE TABLE widgets (id INTEGER);\n")
    );

    let output = std::fs::read_to_string(project.root().join("out/preview.sql")).unwrap();
    assert_eq!(
        output,
        format!(
            "-- File: sql/001_users.sql\n{USERS}\n\n-- File: sql/002_widgets.sql.tmpl\nCREATE TABLE widgets (id INTEGER);\n\n"
        )
    );
    assert!(!project.table_exists("users"));
}

// ============================================================================
// Ledger write policy and events
// ============================================================================

#[test]
fn test_soft_ledger_failures_do_not_stop_the_build() {
    let project = Project::new(&[("sql/001_users.sql", USERS)]);
    project
        .conn
        .execute_batch("DROP TABLE __sqlrun_executions;")
        .unwrap();

    let events = RecordingSink::new();
    let result = project.with_runner(&events, |runner| runner.build(&RunOptions::default()).unwrap());
    assert_eq!(result.files_run, 1);
    assert!(events.names().contains(&"error"));
}

#[test]
fn test_strict_ledger_failures_are_fatal() {
    let mut project = Project::new(&[("sql/001_users.sql", USERS)]);
    project.config.runner.strict_ledger = true;
    project
        .conn
        .execute_batch("DROP TABLE __sqlrun_executions;")
        .unwrap();

    let (err, ops) = project.with_runner(&NullSink, |runner| {
        let err = runner.build(&RunOptions::default()).unwrap_err();
        (err, runner.tracker().operations().unwrap())
    });
    assert!(matches!(err, EngineError::LedgerWrite(_)));
    assert_eq!(ops[0].status, OperationStatus::Failed);
}

#[test]
fn test_build_emits_lifecycle_events() {
    let project = Project::new(&[("sql/001_users.sql", USERS)]);
    let events = RecordingSink::new();
    project.with_runner(&events, |runner| runner.build(&RunOptions::default()).unwrap());
    assert_eq!(
        events.names(),
        vec!["build:start", "file:before", "file:after", "build:complete"]
    );
}

// ============================================================================
// Changesets
// ============================================================================

const ADD_USERS: &str = "changes/2024-01-15-add-users";

fn changeset(project: &Project, name: &str, change: &str, revert: Option<&str>) {
    project.write(&format!("changes/{name}/change/001.sql"), change);
    if let Some(revert) = revert {
        project.write(&format!("changes/{name}/revert/001.sql"), revert);
    }
}

#[test]
fn test_changeset_applies_once() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-15-add-users", "CREATE TABLE users (id INTEGER);", None);

    let (first, second, status) = project.with_runner(&NullSink, |runner| {
        let changes = ChangesetEngine::new(runner);
        let first = changes.run("2024-01-15-add-users", &RunOptions::default()).unwrap();
        let second = changes.run("2024-01-15-add-users", &RunOptions::default()).unwrap();
        (first, second, changes.status("2024-01-15-add-users").unwrap())
    });

    assert!(first.is_success());
    assert_eq!(first.files[0].reason, Some(NeedsRunReason::New));
    assert!(second.operation_id.is_none());
    assert_eq!(second.files[0].skip_reason, Some(SkipReason::AlreadyRun));
    assert_eq!(status, ChangesetStatus::Success);
}

#[test]
fn test_changeset_with_edited_files_reruns() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-15-add-users", USERS, None);

    let result = project.with_runner(&NullSink, |runner| {
        let changes = ChangesetEngine::new(runner);
        changes.run("2024-01-15-add-users", &RunOptions::default()).unwrap();
        project.write(&format!("{ADD_USERS}/change/002.sql"), ORDERS);
        changes.run("2024-01-15-add-users", &RunOptions::default()).unwrap()
    });
    assert_eq!(result.files_run, 2);
    assert_eq!(result.files[0].reason, Some(NeedsRunReason::Changed));
}

#[test]
fn test_revert_then_reapply() {
    let project = Project::new(&[]);
    changeset(
        &project,
        "2024-01-15-add-users",
        "CREATE TABLE users (id INTEGER);",
        Some("DROP TABLE users;"),
    );

    project.with_runner(&NullSink, |runner| {
        let changes = ChangesetEngine::new(runner);
        let name = "2024-01-15-add-users";
        changes.run(name, &RunOptions::default()).unwrap();

        let reverted = changes.revert(name, &RunOptions::default()).unwrap();
        assert!(reverted.is_success());
        assert_eq!(changes.status(name).unwrap(), ChangesetStatus::Reverted);

        let again = changes.revert(name, &RunOptions::default()).unwrap_err();
        assert!(matches!(again, EngineError::ChangesetNotApplied(_)));

        let reapplied = changes.run(name, &RunOptions::default()).unwrap();
        assert_eq!(reapplied.files[0].reason, Some(NeedsRunReason::Reverted));
        assert_eq!(changes.status(name).unwrap(), ChangesetStatus::Success);

        let history = changes.history(name).unwrap();
        assert_eq!(history.len(), 3);
    });
    assert!(project.table_exists("users"));
}

#[test]
fn test_revert_requires_applied_changeset() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-15-add-users", USERS, Some("DROP TABLE users;"));

    let err = project.with_runner(&NullSink, |runner| {
        ChangesetEngine::new(runner)
            .revert("2024-01-15-add-users", &RunOptions::default())
            .unwrap_err()
    });
    assert!(matches!(err, EngineError::ChangesetNotApplied(_)));
}

#[test]
fn test_revert_without_revert_files_is_invalid() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-15-add-users", USERS, None);

    let err = project.with_runner(&NullSink, |runner| {
        let changes = ChangesetEngine::new(runner);
        changes.run("2024-01-15-add-users", &RunOptions::default()).unwrap();
        changes
            .revert("2024-01-15-add-users", &RunOptions::default())
            .unwrap_err()
    });
    assert!(matches!(err, EngineError::ChangesetValidation { .. }));
}

#[test]
fn test_changeset_files_keep_separate_history() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-15-add-users", USERS, None);

    let single = project.with_runner(&NullSink, |runner| {
        ChangesetEngine::new(runner)
            .run("2024-01-15-add-users", &RunOptions::default())
            .unwrap();
        let file = PathBuf::from(ADD_USERS).join("change/001.sql");
        runner.run_file(&file, false).unwrap()
    });
    assert_eq!(single.files_run, 1);
    assert_eq!(single.files[0].reason, Some(NeedsRunReason::New));
}

#[test]
fn test_next_applies_oldest_first() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-01-a", "CREATE TABLE a (id INTEGER);", None);
    changeset(&project, "2024-01-03-c", "CREATE TABLE c (id INTEGER);", None);
    changeset(&project, "2024-01-02-b", "CREATE TABLE b (id INTEGER);", None);

    let (runs, entries) = project.with_runner(&NullSink, |runner| {
        let changes = ChangesetEngine::new(runner);
        let runs = changes.next(2, &RunOptions::default()).unwrap();
        (runs, changes.list().unwrap())
    });

    let applied: Vec<&str> = runs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(applied, vec!["2024-01-01-a", "2024-01-02-b"]);
    let statuses: Vec<ChangesetStatus> = entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![ChangesetStatus::Success, ChangesetStatus::Success, ChangesetStatus::Pending]
    );
    assert!(!project.table_exists("c"));
}

#[test]
fn test_ff_stops_at_first_failure() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-01-a", "CREATE TABLE a (id INTEGER);", None);
    changeset(&project, "2024-01-02-b", BROKEN, None);
    changeset(&project, "2024-01-03-c", "CREATE TABLE c (id INTEGER);", None);

    let (runs, entries) = project.with_runner(&NullSink, |runner| {
        let changes = ChangesetEngine::new(runner);
        let runs = changes.ff(&RunOptions::default()).unwrap();
        (runs, changes.list().unwrap())
    });

    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1].result.as_ref().unwrap().status, BatchStatus::Failed);
    assert_eq!(entries[1].status, ChangesetStatus::Failed);
    assert_eq!(entries[2].status, ChangesetStatus::Pending);
}

#[test]
fn test_ff_applies_everything_pending() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-01-a", "CREATE TABLE a (id INTEGER);", None);
    changeset(&project, "2024-01-02-b", "CREATE TABLE b (id INTEGER);", None);

    let runs = project.with_runner(&NullSink, |runner| {
        let changes = ChangesetEngine::new(runner);
        let runs = changes.ff(&RunOptions::default()).unwrap();
        assert!(changes.ff(&RunOptions::default()).unwrap().is_empty());
        runs
    });
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.is_success()));
}

#[test]
fn test_ff_passes_over_revert_only_folders() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-01-a", "CREATE TABLE a (id INTEGER);", None);
    project.write("changes/2024-01-02-b/revert/001.sql", "DROP TABLE a;");
    changeset(&project, "2024-01-03-c", "CREATE TABLE c (id INTEGER);", None);

    let (runs, entries) = project.with_runner(&NullSink, |runner| {
        let changes = ChangesetEngine::new(runner);
        let runs = changes.ff(&RunOptions::default()).unwrap();
        (runs, changes.list().unwrap())
    });

    let applied: Vec<&str> = runs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(applied, vec!["2024-01-01-a", "2024-01-03-c"]);
    assert!(runs.iter().all(|r| r.is_success()));
    assert!(project.table_exists("a"));
    assert!(project.table_exists("c"));
    let statuses: Vec<ChangesetStatus> = entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![ChangesetStatus::Success, ChangesetStatus::Pending, ChangesetStatus::Success]
    );
}

#[test]
fn test_ff_keeps_earlier_runs_when_a_changeset_errors() {
    let project = Project::new(&[]);
    changeset(
        &project,
        "2024-01-01-a",
        "CREATE TABLE a (id INTEGER);
         CREATE TRIGGER lock_b BEFORE INSERT ON __sqlrun_operations
         WHEN NEW.name = '2024-01-02-b'
         BEGIN SELECT RAISE(ABORT, 'ledger locked'); END;",
        None,
    );
    changeset(&project, "2024-01-02-b", "CREATE TABLE b (id INTEGER);", None);
    changeset(&project, "2024-01-03-c", "CREATE TABLE c (id INTEGER);", None);

    let (runs, entries) = project.with_runner(&NullSink, |runner| {
        let changes = ChangesetEngine::new(runner);
        let runs = changes.ff(&RunOptions::default()).unwrap();
        (runs, changes.list().unwrap())
    });

    assert_eq!(runs.len(), 2);
    assert!(runs[0].is_success());
    assert_eq!(runs[1].name, "2024-01-02-b");
    assert!(runs[1].result.is_none());
    assert!(runs[1].error.as_deref().unwrap().contains("ledger locked"));
    assert!(!project.table_exists("b"));
    assert!(!project.table_exists("c"));
    assert_eq!(entries[0].status, ChangesetStatus::Success);
    assert_eq!(entries[2].status, ChangesetStatus::Pending);
}

#[test]
fn test_orphaned_and_unknown_changesets() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-15-add-users", USERS, None);

    project.with_runner(&NullSink, |runner| {
        let changes = ChangesetEngine::new(runner);
        changes.run("2024-01-15-add-users", &RunOptions::default()).unwrap();
        std::fs::remove_dir_all(project.root().join(ADD_USERS)).unwrap();

        let entries = changes.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ChangesetStatus::Orphaned);
        assert!(entries[0].last_commit.is_some());

        let orphaned = changes.run("2024-01-15-add-users", &RunOptions::default());
        assert!(matches!(orphaned, Err(EngineError::ChangesetOrphaned(_))));
        let missing = changes.run("2024-02-01-nothing", &RunOptions::default());
        assert!(matches!(missing, Err(EngineError::ChangesetNotFound(_))));
    });
}

#[test]
fn test_invalid_changeset_folder_fails_listing() {
    let project = Project::new(&[]);
    changeset(&project, "add-users", USERS, None);

    let err = project.with_runner(&NullSink, |runner| ChangesetEngine::new(runner).list().unwrap_err());
    assert!(matches!(err, EngineError::ChangesetValidation { .. }));
}

#[test]
fn test_changeset_events_wrap_the_batch() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-15-add-users", USERS, None);

    let events = RecordingSink::new();
    project.with_runner(&events, |runner| {
        ChangesetEngine::new(runner)
            .run("2024-01-15-add-users", &RunOptions::default())
            .unwrap()
    });
    assert_eq!(
        events.names(),
        vec!["change:start", "file:before", "file:after", "change:complete"]
    );
}

#[test]
fn test_changeset_dry_run_leaves_status_pending() {
    let project = Project::new(&[]);
    changeset(&project, "2024-01-15-add-users", USERS, None);

    let status = project.with_runner(&NullSink, |runner| {
        let changes = ChangesetEngine::new(runner);
        let result = changes
            .run(
                "2024-01-15-add-users",
                &RunOptions::default().with_mode(RunMode::DryRun),
            )
            .unwrap();
        assert!(result.operation_id.is_none());
        changes.status("2024-01-15-add-users").unwrap()
    });
    assert_eq!(status, ChangesetStatus::Pending);
    assert!(project
        .root()
        .join("tmp")
        .join(ADD_USERS)
        .join("change/001.sql")
        .exists());
}
