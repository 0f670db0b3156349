//! Changesets: named, dated folders applied and reverted as a unit.
//!
//! A changeset lives in `<changes>/<YYYY-MM-DD-description>/` and holds a
//! `change/` directory of forward SQL and a `revert/` directory that undoes
//! it. Changesets are tracked by name, not by file: the whole `change/` set
//! runs as one batch, gated by the combined checksum of its files.
//!
//! Commit and revert histories are independent. The derived status of a
//! changeset comes from its latest commit and latest revert operations:
//!
//! | latest commit | latest revert (newer, success) | status     |
//! |---------------|--------------------------------|------------|
//! | none          | any                            | `pending`  |
//! | any           | yes                            | `reverted` |
//! | success       | no                             | `success`  |
//! | failed        | no                             | `failed`   |
//! | stale         | no                             | `stale`    |
//! | pending       | no                             | `pending`  |
//!
//! A name with history but no folder on disk is `orphaned`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use sqlrun_core::{
    BatchResult, ChangeType, Direction, FileResult, NeedsRun, NeedsRunReason, OperationRecord,
    OperationStatus, SkipReason,
};
use sqlrun_files::{FilesError, discover_files};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::events::Event;
use crate::runner::{BatchPlan, RunMode, RunOptions, Runner};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})-(.+)$").expect("static regex must compile")
});

/// Subdirectory holding forward SQL.
pub const CHANGE_DIR: &str = "change";

/// Subdirectory holding revert SQL.
pub const REVERT_DIR: &str = "revert";

/// A validated changeset folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Changeset {
    /// Folder name, `YYYY-MM-DD-description`.
    pub name: String,
    pub path: PathBuf,
    pub date: NaiveDate,
    pub description: String,
    pub change_files: Vec<PathBuf>,
    pub revert_files: Vec<PathBuf>,
}

/// Status of a changeset derived from its ledger history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangesetStatus {
    Pending,
    Success,
    Reverted,
    Failed,
    Stale,
    Orphaned,
}

impl ChangesetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangesetStatus::Pending => "pending",
            ChangesetStatus::Success => "success",
            ChangesetStatus::Reverted => "reverted",
            ChangesetStatus::Failed => "failed",
            ChangesetStatus::Stale => "stale",
            ChangesetStatus::Orphaned => "orphaned",
        }
    }

    /// Whether `next` and `ff` would apply a changeset in this state.
    pub fn is_eligible(self) -> bool {
        matches!(self, ChangesetStatus::Pending | ChangesetStatus::Reverted)
    }
}

impl fmt::Display for ChangesetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of [`ChangesetEngine::list`].
#[derive(Debug, Clone, Serialize)]
pub struct ChangesetEntry {
    pub name: String,
    /// Parsed from the name; `None` for orphans whose name does not parse.
    pub date: Option<NaiveDate>,
    pub status: ChangesetStatus,
    /// `None` for orphaned entries.
    pub changeset: Option<Changeset>,
    pub last_commit: Option<OperationRecord>,
    pub last_revert: Option<OperationRecord>,
}

/// Outcome of one changeset applied by [`ChangesetEngine::next`].
///
/// `result` is `None` when the changeset failed before its batch could
/// run; `error` then says why.
#[derive(Debug, Clone, Serialize)]
pub struct ChangesetRun {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<BatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChangesetRun {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.result.as_ref().is_some_and(BatchResult::is_success)
    }
}

/// Splits a changeset name into its date and description.
///
/// # Examples
///
/// ```
/// use sqlrun_engine::parse_changeset_name;
///
/// let (date, description) = parse_changeset_name("2024-01-15-add-users").unwrap();
/// assert_eq!(date.to_string(), "2024-01-15");
/// assert_eq!(description, "add-users");
///
/// assert!(parse_changeset_name("add-users").is_none());
/// assert!(parse_changeset_name("2024-13-40-bad-date").is_none());
/// ```
pub fn parse_changeset_name(name: &str) -> Option<(NaiveDate, String)> {
    let caps = NAME_RE.captures(name)?;
    let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
    Some((date, caps[2].to_string()))
}

/// Checks a changeset folder and lists its files.
///
/// # Errors
///
/// Returns [`EngineError::ChangesetValidation`] when the folder name has no
/// valid date prefix or the folder has neither change nor revert files.
pub fn validate_changeset(path: &Path) -> Result<Changeset> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EngineError::ChangesetValidation {
            name: path.display().to_string(),
            reason: "folder name is not valid UTF-8".to_string(),
        })?
        .to_string();

    let Some((date, description)) = parse_changeset_name(&name) else {
        return Err(EngineError::ChangesetValidation {
            name,
            reason: "name must be YYYY-MM-DD-description with a valid date".to_string(),
        });
    };

    let change_files = files_in(&path.join(CHANGE_DIR))?;
    let revert_files = files_in(&path.join(REVERT_DIR))?;
    if change_files.is_empty() && revert_files.is_empty() {
        return Err(EngineError::ChangesetValidation {
            name,
            reason: format!("no SQL files under {CHANGE_DIR}/ or {REVERT_DIR}/"),
        });
    }

    Ok(Changeset {
        name,
        path: path.to_path_buf(),
        date,
        description,
        change_files,
        revert_files,
    })
}

fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    if dir.is_dir() {
        Ok(discover_files(dir)?)
    } else {
        Ok(Vec::new())
    }
}

/// Lists and validates every changeset folder, oldest date first.
///
/// A missing changes directory yields an empty list. Any invalid folder
/// fails the whole call.
pub fn discover_changesets(changes_dir: &Path) -> Result<Vec<Changeset>> {
    if !changes_dir.exists() {
        return Ok(Vec::new());
    }
    let discovery = |source| {
        EngineError::Files(FilesError::DiscoveryError {
            path: changes_dir.to_path_buf(),
            source,
        })
    };

    let mut changesets = Vec::new();
    for entry in std::fs::read_dir(changes_dir).map_err(discovery)? {
        let path = entry.map_err(discovery)?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if !path.is_dir() || hidden {
            continue;
        }
        changesets.push(validate_changeset(&path)?);
    }

    changesets.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name.cmp(&b.name)));
    debug!(dir = %changes_dir.display(), count = changesets.len(), "changesets discovered");
    Ok(changesets)
}

/// Derives a changeset's status from its latest commit and revert.
pub fn derive_status(
    commit: Option<&OperationRecord>,
    revert: Option<&OperationRecord>,
) -> ChangesetStatus {
    let Some(commit) = commit else {
        return ChangesetStatus::Pending;
    };
    if revert.is_some_and(|r| r.id > commit.id && r.status == OperationStatus::Success) {
        return ChangesetStatus::Reverted;
    }
    match commit.status {
        OperationStatus::Pending => ChangesetStatus::Pending,
        OperationStatus::Success => ChangesetStatus::Success,
        OperationStatus::Failed => ChangesetStatus::Failed,
        OperationStatus::Stale => ChangesetStatus::Stale,
    }
}

type Latest<'o> = (Option<&'o OperationRecord>, Option<&'o OperationRecord>);

fn latest_by_name(ops: &[OperationRecord]) -> BTreeMap<&str, Latest<'_>> {
    let mut latest: BTreeMap<&str, Latest<'_>> = BTreeMap::new();
    for op in ops {
        let slot = latest.entry(op.name.as_str()).or_default();
        match op.direction {
            Direction::Commit => slot.0 = Some(op),
            Direction::Revert => slot.1 = Some(op),
        }
    }
    latest
}

/// Lists, applies, and reverts changesets through a [`Runner`].
pub struct ChangesetEngine<'a> {
    runner: &'a Runner<'a>,
    changes_dir: PathBuf,
}

impl<'a> ChangesetEngine<'a> {
    /// Uses the changes directory from the runner's config.
    pub fn new(runner: &'a Runner<'a>) -> Self {
        let ctx = runner.context();
        let changes_dir = ctx.resolve(&ctx.config.paths.changes);
        Self {
            runner,
            changes_dir,
        }
    }

    /// On-disk changesets, oldest first.
    pub fn discover(&self) -> Result<Vec<Changeset>> {
        discover_changesets(&self.changes_dir)
    }

    /// Every changeset with its derived status, followed by orphaned
    /// history entries.
    pub fn list(&self) -> Result<Vec<ChangesetEntry>> {
        let changesets = self.discover()?;
        let ops = self.runner.tracker().changeset_operations()?;
        let latest = latest_by_name(&ops);

        let mut entries: Vec<ChangesetEntry> = changesets
            .into_iter()
            .map(|changeset| {
                let (commit, revert) = latest.get(changeset.name.as_str()).copied().unwrap_or_default();
                ChangesetEntry {
                    name: changeset.name.clone(),
                    date: Some(changeset.date),
                    status: derive_status(commit, revert),
                    changeset: Some(changeset),
                    last_commit: commit.cloned(),
                    last_revert: revert.cloned(),
                }
            })
            .collect();

        let orphans: Vec<ChangesetEntry> = latest
            .iter()
            .filter(|(name, _)| !entries.iter().any(|e| e.name == **name))
            .map(|(name, (commit, revert))| ChangesetEntry {
                name: name.to_string(),
                date: parse_changeset_name(name).map(|(date, _)| date),
                status: ChangesetStatus::Orphaned,
                changeset: None,
                last_commit: commit.cloned(),
                last_revert: revert.cloned(),
            })
            .collect();
        entries.extend(orphans);
        Ok(entries)
    }

    /// Finds an on-disk changeset by name.
    ///
    /// # Errors
    ///
    /// [`EngineError::ChangesetOrphaned`] if only history exists for the
    /// name, [`EngineError::ChangesetNotFound`] if nothing does.
    pub fn find(&self, name: &str) -> Result<Changeset> {
        if let Some(changeset) = self.discover()?.into_iter().find(|c| c.name == name) {
            return Ok(changeset);
        }
        if self.history(name)?.is_empty() {
            Err(EngineError::ChangesetNotFound(name.to_string()))
        } else {
            Err(EngineError::ChangesetOrphaned(name.to_string()))
        }
    }

    /// Operations recorded for a changeset, oldest first.
    pub fn history(&self, name: &str) -> Result<Vec<OperationRecord>> {
        self.runner.tracker().history(name)
    }

    /// Current derived status of a changeset.
    pub fn status(&self, name: &str) -> Result<ChangesetStatus> {
        let ops = self.history(name)?;
        let latest = latest_by_name(&ops);
        let (commit, revert) = latest.get(name).copied().unwrap_or_default();
        Ok(derive_status(commit, revert))
    }

    /// Applies a changeset's `change/` files as one batch.
    ///
    /// An applied changeset whose files are unchanged is skipped unless
    /// `opts.force` is set; the result then lists every file as skipped
    /// with reason `already-run` and carries no operation id.
    pub fn run(&self, name: &str, opts: &RunOptions) -> Result<BatchResult> {
        let changeset = self.find(name)?;
        if changeset.change_files.is_empty() {
            return Err(EngineError::ChangesetValidation {
                name: name.to_string(),
                reason: format!("no SQL files under {CHANGE_DIR}/"),
            });
        }

        let mut plan = self.runner.plan(
            name.to_string(),
            ChangeType::Change,
            Direction::Commit,
            changeset.change_files,
        );
        self.emit(Event::ChangeStart {
            name: name.to_string(),
            direction: Direction::Commit,
        });

        let result = if opts.mode == RunMode::Execute {
            let checksum = plan.checksum();
            match self
                .runner
                .tracker()
                .needs_run_by_name(name, &checksum, opts.force)
            {
                NeedsRun::Skip { reason, .. } => {
                    info!(%name, reason = reason.as_str(), "changeset already applied");
                    self.skipped(&plan, reason)
                }
                NeedsRun::Run { reason, .. } => {
                    info!(%name, reason = reason.as_str(), "applying changeset");
                    plan.unit_reason = Some(reason);
                    self.runner.execute_batch(&plan, opts)?
                }
            }
        } else {
            self.runner.execute_batch(&plan, opts)?
        };

        self.emit(Event::ChangeComplete {
            name: name.to_string(),
            direction: Direction::Commit,
            status: result.status,
        });
        Ok(result)
    }

    /// Runs a changeset's `revert/` files as one batch.
    ///
    /// # Errors
    ///
    /// [`EngineError::ChangesetNotApplied`] unless the changeset's derived
    /// status is `success` or `failed`.
    pub fn revert(&self, name: &str, opts: &RunOptions) -> Result<BatchResult> {
        let changeset = self.find(name)?;
        if opts.mode == RunMode::Execute
            && !matches!(
                self.status(name)?,
                ChangesetStatus::Success | ChangesetStatus::Failed
            )
        {
            return Err(EngineError::ChangesetNotApplied(name.to_string()));
        }
        if changeset.revert_files.is_empty() {
            return Err(EngineError::ChangesetValidation {
                name: name.to_string(),
                reason: format!("no SQL files under {REVERT_DIR}/"),
            });
        }

        let mut plan = self.runner.plan(
            name.to_string(),
            ChangeType::Change,
            Direction::Revert,
            changeset.revert_files,
        );
        plan.unit_reason = Some(if opts.force {
            NeedsRunReason::Force
        } else {
            NeedsRunReason::New
        });

        self.emit(Event::ChangeStart {
            name: name.to_string(),
            direction: Direction::Revert,
        });
        let result = self.runner.execute_batch(&plan, opts)?;
        self.emit(Event::ChangeComplete {
            name: name.to_string(),
            direction: Direction::Revert,
            status: result.status,
        });
        Ok(result)
    }

    /// Applies up to `n` pending or reverted changesets, oldest first,
    /// stopping after the first one that does not fully succeed.
    ///
    /// Folders without `change/` files are passed over. A changeset that
    /// errors before its batch runs is recorded as the last entry instead
    /// of discarding the runs before it.
    pub fn next(&self, n: usize, opts: &RunOptions) -> Result<Vec<ChangesetRun>> {
        let mut names = Vec::new();
        for entry in self.list()? {
            if names.len() == n {
                break;
            }
            let Some(changeset) = &entry.changeset else {
                continue;
            };
            if !entry.status.is_eligible() {
                continue;
            }
            if changeset.change_files.is_empty() {
                warn!(name = %entry.name, "skipping changeset without change files");
                continue;
            }
            names.push(entry.name);
        }

        let mut runs = Vec::with_capacity(names.len());
        for name in names {
            let run = match self.run(&name, opts) {
                Ok(result) => ChangesetRun {
                    name,
                    result: Some(result),
                    error: None,
                },
                Err(err) => {
                    warn!(%name, error = %err, "changeset could not be applied");
                    ChangesetRun {
                        name,
                        result: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            let stop = !run.is_success();
            if stop {
                info!(name = %run.name, "stopping after failed changeset");
            }
            runs.push(run);
            if stop {
                break;
            }
        }
        Ok(runs)
    }

    /// Applies every eligible changeset in order.
    pub fn ff(&self, opts: &RunOptions) -> Result<Vec<ChangesetRun>> {
        self.next(usize::MAX, opts)
    }

    fn skipped(&self, plan: &BatchPlan, reason: SkipReason) -> BatchResult {
        let files = plan
            .entries
            .iter()
            .map(|entry| {
                self.emit(Event::FileSkip {
                    filepath: entry.filepath.clone(),
                    reason,
                });
                FileResult::skipped(
                    entry.filepath.clone(),
                    entry.checksum.clone().unwrap_or_default(),
                    reason,
                )
            })
            .collect();
        BatchResult::from_files(files, 0, None, plan.checksum())
    }

    fn emit(&self, event: Event) {
        self.runner.context().events.emit(&event);
    }
}
