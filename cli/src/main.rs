use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use serde::Serialize;
use sqlrun_core::{BatchResult, FileStatus, OperationRecord};
use sqlrun_engine::{ChangesetEngine, ChangesetRun, RunContext, RunMode, RunOptions, Runner};
use sqlrun_files::{DEFAULT_CONFIG_FILE, ProjectConfig};
use sqlrun_sqlite::{LedgerMigration, SqliteExecutor, SqliteLedger};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the default log filter.
const LOG_ENV: &str = "SQLRUN_LOG";

#[derive(Debug, Parser)]
#[command(name = "sqlrun")]
#[command(about = "Ledger-tracked SQL builds and changesets")]
#[command(version)]
struct Cli {
    /// Project config file; its directory is the project root.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Log filter such as `info` or `sqlrun_engine=debug` (default: $SQLRUN_LOG, then warn).
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every file in the configured sql directory.
    Build(BatchArgs),
    /// Run a single file, a directory, or an explicit list of files.
    Run(RunArgs),
    /// List, apply, and revert changesets.
    Change(ChangeArgs),
    /// Create, drop, and inspect the ledger tables.
    Ledger(LedgerArgs),
}

#[derive(Debug, Clone, Args)]
struct BatchArgs {
    /// Run files even when the ledger says they are unchanged.
    #[arg(long)]
    force: bool,
    /// Render files into the tmp directory without executing them.
    #[arg(long, conflicts_with = "preview")]
    dry_run: bool,
    /// Render files and print them without executing.
    #[arg(long)]
    preview: bool,
    /// Write preview output to this file instead of stdout.
    #[arg(long, requires = "preview")]
    output: Option<PathBuf>,
    /// Keep running after a file fails.
    #[arg(long)]
    continue_on_error: bool,
    /// Print results as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(subcommand)]
    target: RunTarget,
}

#[derive(Debug, Subcommand)]
enum RunTarget {
    /// Run one file as its own operation.
    File {
        path: PathBuf,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Run every file under a directory.
    Dir {
        path: PathBuf,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Run the given files in the given order.
    Files {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        batch: BatchArgs,
    },
}

#[derive(Debug, Args)]
struct ChangeArgs {
    #[command(subcommand)]
    operation: ChangeOperation,
}

#[derive(Debug, Subcommand)]
enum ChangeOperation {
    /// List changesets with their status.
    List {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Apply a changeset by name.
    Run {
        name: String,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Revert an applied changeset by name.
    Revert {
        name: String,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Apply the next N pending changesets in date order.
    Next {
        #[arg(default_value_t = 1)]
        count: usize,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Apply every pending changeset in date order.
    Ff {
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Show recorded operations for a changeset.
    History {
        name: String,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct LedgerArgs {
    #[command(subcommand)]
    operation: LedgerOperation,
}

#[derive(Debug, Subcommand)]
enum LedgerOperation {
    /// Create the ledger tables.
    Up,
    /// Drop the ledger tables and all history.
    Down,
    /// Show whether the ledger exists and how many rows it holds.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Mark every finished operation stale so the next build reruns everything.
    Stale,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let result = match cli.command {
        Command::Build(args) => run_build(&cli.config, args),
        Command::Run(args) => run_run(&cli.config, args),
        Command::Change(args) => run_change(&cli.config, args),
        Command::Ledger(args) => run_ledger(&cli.config, args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ----------------------------------------------------------------------------
// Project loading
// ----------------------------------------------------------------------------

/// A loaded config with an open database connection.
struct Project {
    root: PathBuf,
    config: ProjectConfig,
    conn: Connection,
}

impl Project {
    fn open(config_path: &Path) -> Result<Self, String> {
        let config = ProjectConfig::load(config_path)
            .map_err(|e| format!("Failed to load config '{}': {e}", config_path.display()))?;
        let config_path = fs::canonicalize(config_path)
            .map_err(|e| format!("Failed to resolve '{}': {e}", config_path.display()))?;
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let db = config.resolve(&root, &config.database);
        let conn = Connection::open(&db)
            .map_err(|e| format!("Failed to open database '{}': {e}", db.display()))?;
        debug!(root = %root.display(), db = %db.display(), config = %config.name, "project opened");
        Ok(Self { root, config, conn })
    }

    fn migration(&self) -> Result<LedgerMigration<'_>, String> {
        LedgerMigration::new(&self.conn, &self.config.ledger.prefix)
            .map_err(|e| format!("Failed to initialize ledger: {e}"))
    }

    /// Builds a runner over this project, creating the ledger if needed.
    fn with_runner<T>(&self, f: impl FnOnce(&Runner<'_>) -> Result<T, String>) -> Result<T, String> {
        self.migration()?
            .up()
            .map_err(|e| format!("Failed to create ledger tables: {e}"))?;
        let ledger = SqliteLedger::new(&self.conn, &self.config.ledger.prefix)
            .map_err(|e| format!("Failed to open ledger: {e}"))?;
        let exec = SqliteExecutor::new(&self.conn);
        let runner = Runner::new(RunContext::new(&self.root, &self.config, &ledger, &exec));
        f(&runner)
    }
}

/// Resolves a command-line path against the working directory.
fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    fs::canonicalize(&joined).unwrap_or(joined)
}

impl BatchArgs {
    fn options(&self, config: &ProjectConfig) -> RunOptions {
        let mode = if self.preview {
            RunMode::Preview {
                output: self.output.as_deref().map(absolute),
            }
        } else if self.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Execute
        };
        let mut opts = RunOptions::from_config(&config.runner)
            .with_force(self.force)
            .with_mode(mode);
        if self.continue_on_error {
            opts.abort_on_error = false;
        }
        opts
    }
}

// ----------------------------------------------------------------------------
// build / run
// ----------------------------------------------------------------------------

fn run_build(config: &Path, args: BatchArgs) -> Result<(), String> {
    let project = Project::open(config)?;
    let opts = args.options(&project.config);
    let result = project.with_runner(|runner| runner.build(&opts).map_err(|e| e.to_string()))?;
    report_batch("build", &result, &args)
}

fn run_run(config: &Path, args: RunArgs) -> Result<(), String> {
    let project = Project::open(config)?;
    match args.target {
        RunTarget::File { path, batch } => {
            let opts = batch.options(&project.config);
            let path = absolute(&path);
            let result = project.with_runner(|runner| {
                let outcome = if opts.mode == RunMode::Execute {
                    runner.run_file(&path, opts.force)
                } else {
                    runner.run_files(std::slice::from_ref(&path), &opts)
                };
                outcome.map_err(|e| e.to_string())
            })?;
            report_batch("run", &result, &batch)
        }
        RunTarget::Dir { path, batch } => {
            let opts = batch.options(&project.config);
            let path = absolute(&path);
            let result =
                project.with_runner(|runner| runner.run_dir(&path, &opts).map_err(|e| e.to_string()))?;
            report_batch("run", &result, &batch)
        }
        RunTarget::Files { paths, batch } => {
            let opts = batch.options(&project.config);
            let paths: Vec<PathBuf> = paths.iter().map(|p| absolute(p)).collect();
            let result = project
                .with_runner(|runner| runner.run_files(&paths, &opts).map_err(|e| e.to_string()))?;
            report_batch("run", &result, &batch)
        }
    }
}

// ----------------------------------------------------------------------------
// change
// ----------------------------------------------------------------------------

fn run_change(config: &Path, args: ChangeArgs) -> Result<(), String> {
    let project = Project::open(config)?;
    match args.operation {
        ChangeOperation::List { json } => project.with_runner(|runner| {
            let entries = ChangesetEngine::new(runner)
                .list()
                .map_err(|e| e.to_string())?;
            if json {
                return print_json(&entries);
            }
            if entries.is_empty() {
                println!("No changesets found.");
            }
            for entry in &entries {
                let files = entry
                    .changeset
                    .as_ref()
                    .map(|c| format!("{} change, {} revert", c.change_files.len(), c.revert_files.len()))
                    .unwrap_or_else(|| "missing on disk".to_string());
                println!("{:<10} {}  ({files})", entry.status.as_str(), entry.name);
            }
            Ok(())
        }),
        ChangeOperation::Run { name, batch } => {
            let opts = batch.options(&project.config);
            let result = project.with_runner(|runner| {
                ChangesetEngine::new(runner)
                    .run(&name, &opts)
                    .map_err(|e| e.to_string())
            })?;
            report_batch(&name, &result, &batch)
        }
        ChangeOperation::Revert { name, batch } => {
            let opts = batch.options(&project.config);
            let result = project.with_runner(|runner| {
                ChangesetEngine::new(runner)
                    .revert(&name, &opts)
                    .map_err(|e| e.to_string())
            })?;
            report_batch(&format!("revert {name}"), &result, &batch)
        }
        ChangeOperation::Next { count, batch } => {
            let opts = batch.options(&project.config);
            let runs = project.with_runner(|runner| {
                ChangesetEngine::new(runner)
                    .next(count, &opts)
                    .map_err(|e| e.to_string())
            })?;
            report_runs(&runs, &batch)
        }
        ChangeOperation::Ff { batch } => {
            let opts = batch.options(&project.config);
            let runs = project.with_runner(|runner| {
                ChangesetEngine::new(runner)
                    .ff(&opts)
                    .map_err(|e| e.to_string())
            })?;
            report_runs(&runs, &batch)
        }
        ChangeOperation::History { name, json } => project.with_runner(|runner| {
            let history = ChangesetEngine::new(runner)
                .history(&name)
                .map_err(|e| e.to_string())?;
            if json {
                return print_json(&history);
            }
            if history.is_empty() {
                println!("No history for '{name}'.");
            }
            for op in &history {
                print_operation(op);
            }
            Ok(())
        }),
    }
}

// ----------------------------------------------------------------------------
// ledger
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct LedgerReport {
    prefix: String,
    tables_exist: bool,
    operation_count: usize,
    execution_count: usize,
}

fn run_ledger(config: &Path, args: LedgerArgs) -> Result<(), String> {
    let project = Project::open(config)?;
    let prefix = &project.config.ledger.prefix;
    match args.operation {
        LedgerOperation::Up => {
            project
                .migration()?
                .up()
                .map_err(|e| format!("Ledger up failed: {e}"))?;
            println!("Ledger tables created with prefix '{prefix}'.");
        }
        LedgerOperation::Down => {
            project
                .migration()?
                .down()
                .map_err(|e| format!("Ledger down failed: {e}"))?;
            println!("Ledger tables with prefix '{prefix}' dropped.");
        }
        LedgerOperation::Status { json } => {
            let status = project
                .migration()?
                .status()
                .map_err(|e| format!("Failed to get ledger status: {e}"))?;
            let report = LedgerReport {
                prefix: prefix.clone(),
                tables_exist: status.tables_exist,
                operation_count: status.operation_count,
                execution_count: status.execution_count,
            };
            if json {
                return print_json(&report);
            }
            println!("Ledger Status:");
            println!("  Prefix: {}", report.prefix);
            println!(
                "  Tables exist: {}",
                if report.tables_exist { "yes" } else { "no" }
            );
            println!("  Operations: {}", report.operation_count);
            println!("  Executions: {}", report.execution_count);
        }
        LedgerOperation::Stale => {
            let count = project
                .with_runner(|runner| runner.tracker().mark_stale().map_err(|e| e.to_string()))?;
            println!("Marked {count} operations stale for config '{}'.", project.config.name);
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Output
// ----------------------------------------------------------------------------

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize output: {e}"))?;
    println!("{json}");
    Ok(())
}

fn print_operation(op: &OperationRecord) {
    let error = op
        .error_message
        .as_deref()
        .map(|e| format!(": {e}"))
        .unwrap_or_default();
    println!(
        "#{:<5} {:<7} {:<8} {}  {}{error}",
        op.id,
        op.direction.as_str(),
        op.status.as_str(),
        op.executed_at,
        op.executed_by
    );
}

fn print_files(result: &BatchResult) {
    for file in &result.files {
        match file.status {
            FileStatus::Success => println!(
                "  ok       {} ({} ms)",
                file.filepath,
                file.duration_ms.unwrap_or_default()
            ),
            FileStatus::Skipped => println!(
                "  skipped  {} ({})",
                file.filepath,
                file.skip_reason.map(|r| r.as_str()).unwrap_or("skipped")
            ),
            FileStatus::Failed => println!(
                "  FAILED   {}: {}",
                file.filepath,
                file.error.as_deref().unwrap_or("unknown error")
            ),
            FileStatus::Rendered => println!("  rendered {}", file.filepath),
        }
    }
}

/// Prints a batch result and turns anything short of success into an error.
fn report_batch(label: &str, result: &BatchResult, args: &BatchArgs) -> Result<(), String> {
    if args.json {
        print_json(result)?;
    } else if args.preview && args.output.is_none() {
        for file in &result.files {
            if let Some(sql) = &file.rendered_sql {
                println!("-- File: {}\n{}\n", file.filepath, sql.trim_end());
            }
        }
    } else {
        print_files(result);
        println!(
            "{label}: {} ({} run, {} skipped, {} failed in {} ms)",
            result.status.as_str(),
            result.files_run,
            result.files_skipped,
            result.files_failed,
            result.duration_ms
        );
    }
    batch_outcome(label, result)
}

fn report_runs(runs: &[ChangesetRun], args: &BatchArgs) -> Result<(), String> {
    if args.json {
        print_json(runs)?;
    } else if runs.is_empty() {
        println!("No pending changesets.");
    } else {
        for run in runs {
            match (&run.result, &run.error) {
                (Some(result), _) => {
                    print_files(result);
                    println!("{}: {}", run.name, result.status.as_str());
                }
                (None, error) => {
                    println!("{}: error: {}", run.name, error.as_deref().unwrap_or("unknown"));
                }
            }
        }
    }
    runs.iter().try_for_each(|run| match (&run.result, &run.error) {
        (Some(result), _) => batch_outcome(&run.name, result),
        (None, error) => Err(format!("{}: {}", run.name, error.as_deref().unwrap_or("unknown"))),
    })
}

fn batch_outcome(label: &str, result: &BatchResult) -> Result<(), String> {
    if result.is_success() {
        return Ok(());
    }
    match result.first_error() {
        Some(err) => Err(format!("{label} {}: {err}", result.status.as_str())),
        None => Err(format!("{label} {}", result.status.as_str())),
    }
}
