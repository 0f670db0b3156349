//! Project configuration for sqlrun.
//!
//! Defines the YAML-serializable configuration that names the target
//! database, the project directories, ledger table prefix, runner behavior,
//! the identity recorded on operations, and template variables.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! name: dev
//! database: dev.db
//! paths:
//!   sql: sql
//!   changes: changes
//!   tmp: tmp
//! ledger:
//!   prefix: __sqlrun_
//! runner:
//!   abort_on_error: true
//!   concurrency: 1
//!   strict_ledger: false
//! identity:
//!   name: Ada Lovelace
//!   email: ada@example.com
//! vars:
//!   schema: app
//! secrets:
//!   app_password: hunter2
//! ```

use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FilesError, Result};

/// Default name of the project config file.
pub const DEFAULT_CONFIG_FILE: &str = "sqlrun.yml";

/// Project directories, relative to the project root unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the build SQL files.
    pub sql: PathBuf,
    /// Directory holding changeset folders.
    pub changes: PathBuf,
    /// Scratch directory for dry-run output.
    pub tmp: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sql: PathBuf::from("sql"),
            changes: PathBuf::from("changes"),
            tmp: PathBuf::from("tmp"),
        }
    }
}

/// Where the ledger tables live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Table prefix; alphanumerics and underscores only.
    pub prefix: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            prefix: "__sqlrun_".to_string(),
        }
    }
}

/// Settings controlling batch execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Stop a batch at its first failed file.
    pub abort_on_error: bool,
    /// Requested parallelism. Execution is sequential; values above 1 are
    /// accepted and ignored.
    pub concurrency: usize,
    /// Treat ledger write failures as fatal instead of logging them.
    pub strict_ledger: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            abort_on_error: true,
            concurrency: 1,
            strict_ledger: false,
        }
    }
}

/// Identity recorded as `executed_by` on every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Top-level project configuration.
///
/// Loaded from a YAML file (typically `sqlrun.yml` in the project root).
/// Relative paths resolve against the directory containing that file.
///
/// # Examples
///
/// ```
/// use sqlrun_files::ProjectConfig;
///
/// let config: ProjectConfig = serde_yaml::from_str("name: dev\ndatabase: dev.db\n").unwrap();
/// assert_eq!(config.paths.sql.to_str(), Some("sql"));
/// assert!(config.runner.abort_on_error);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Configuration format version (e.g., `"1.0"`).
    #[serde(default = "default_version")]
    pub version: String,
    /// Config name; scopes every ledger lookup.
    pub name: String,
    /// Database location.
    pub database: PathBuf,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityConfig>,
    /// Template variables exposed as `{{ name }}`.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Config-scoped secrets exposed as `{{ secrets.name }}`.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
    /// Project-wide secrets exposed as `{{ global_secrets.name }}`.
    #[serde(default)]
    pub global_secrets: BTreeMap<String, String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl ProjectConfig {
    /// Creates a config with defaults for everything but name and database.
    pub fn new(name: impl Into<String>, database: impl Into<PathBuf>) -> Self {
        Self {
            version: default_version(),
            name: name.into(),
            database: database.into(),
            paths: PathsConfig::default(),
            ledger: LedgerConfig::default(),
            runner: RunnerConfig::default(),
            identity: None,
            vars: BTreeMap::new(),
            secrets: BTreeMap::new(),
            global_secrets: BTreeMap::new(),
        }
    }

    /// Loads and validates configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::IoError`] if the file cannot be read,
    /// [`FilesError::YamlError`] if parsing fails, or
    /// [`FilesError::InvalidConfig`] if validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| FilesError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks semantic constraints that YAML parsing cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FilesError::InvalidConfig("name cannot be empty".into()));
        }
        if self.runner.concurrency == 0 {
            return Err(FilesError::InvalidConfig(
                "runner.concurrency must be at least 1".into(),
            ));
        }
        let prefix = &self.ledger.prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FilesError::InvalidConfig(format!(
                "ledger.prefix '{prefix}' must contain only alphanumeric characters and underscores"
            )));
        }
        Ok(())
    }

    /// Resolves a configured path against the project root.
    pub fn resolve(&self, root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}
