//! Recursive discovery of executable SQL files.
//!
//! Execution order follows discovery order, and numeric filename prefixes
//! (`001_users.sql`, `002_orders.sql`) are how users sequence their files,
//! so the result is always sorted by the full path string.
//!
//! ```no_run
//! use sqlrun_files::discover_files;
//!
//! for path in discover_files("sql/").unwrap() {
//!     println!("{}", path.display());
//! }
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{FilesError, Result};

/// Extension of plain SQL files.
pub const SQL_EXTENSION: &str = ".sql";

/// Extension of templated SQL files.
pub const TEMPLATE_EXTENSION: &str = ".sql.tmpl";

/// Returns `true` if the file name ends in a recognized SQL-bearing extension.
///
/// # Examples
///
/// ```
/// use sqlrun_files::is_sql_file;
///
/// assert!(is_sql_file("tables/001_users.sql"));
/// assert!(is_sql_file("views/active.sql.tmpl"));
/// assert!(!is_sql_file("README.md"));
/// ```
pub fn is_sql_file(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.ends_with(SQL_EXTENSION) || name.ends_with(TEMPLATE_EXTENSION))
}

/// Returns `true` if the file is a templated SQL file.
pub fn is_template_file(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.ends_with(TEMPLATE_EXTENSION))
}

/// Strips the template suffix, turning `x.sql.tmpl` into `x.sql`.
///
/// Paths without the suffix are returned unchanged.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sqlrun_files::strip_template_suffix;
///
/// assert_eq!(strip_template_suffix(Path::new("a/b.sql.tmpl")), Path::new("a/b.sql"));
/// assert_eq!(strip_template_suffix(Path::new("a/b.sql")), Path::new("a/b.sql"));
/// ```
pub fn strip_template_suffix(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_suffix(".tmpl")) {
        Some(stripped) if is_template_file(path) => PathBuf::from(stripped),
        _ => path.to_path_buf(),
    }
}

/// Finds every SQL file under `root`, recursing into subdirectories.
///
/// The result is sorted lexicographically by full path. An empty directory
/// yields an empty list.
///
/// # Errors
///
/// Returns [`FilesError::DiscoveryError`] carrying the offending path if
/// `root` or any subdirectory cannot be read. Discovery never returns a
/// partial list.
pub fn discover_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let mut found = Vec::new();
    walk(root, &mut found)?;
    found.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));
    debug!(root = %root.display(), files = found.len(), "discovered sql files");
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let discovery_error = |source| FilesError::DiscoveryError {
        path: dir.to_path_buf(),
        source,
    };

    for entry in std::fs::read_dir(dir).map_err(discovery_error)? {
        let entry = entry.map_err(discovery_error)?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(discovery_error)?;
        if file_type.is_dir() || (file_type.is_symlink() && path.is_dir()) {
            walk(&path, found)?;
        } else if is_sql_file(&path) {
            found.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "SELECT 1;").unwrap();
    }

    fn names(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_sorted_by_numeric_prefix() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "002_b.sql");
        touch(dir.path(), "001_a.sql");

        let files = discover_files(dir.path()).unwrap();
        assert_eq!(names(dir.path(), &files), vec!["001_a.sql", "002_b.sql"]);
    }

    #[test]
    fn test_recurses_and_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "tables/001_users.sql");
        touch(dir.path(), "tables/nested/002_roles.sql.tmpl");
        touch(dir.path(), "views/active.sql");
        touch(dir.path(), "notes.md");
        touch(dir.path(), "tables/backup.sql.bak");

        let files = discover_files(dir.path()).unwrap();
        assert_eq!(
            names(dir.path(), &files),
            vec![
                "tables/001_users.sql",
                "tables/nested/002_roles.sql.tmpl",
                "views/active.sql",
            ]
        );
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        match discover_files(&missing) {
            Err(FilesError::DiscoveryError { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected discovery error, got {other:?}"),
        }
    }

    #[test]
    fn test_template_detection() {
        assert!(is_template_file("x.sql.tmpl"));
        assert!(!is_template_file("x.sql"));
        assert!(!is_sql_file("x.tmpl"));
    }
}
