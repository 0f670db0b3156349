//! Content fingerprints for SQL files and batches.
//!
//! A file's checksum is the SHA-256 of its raw on-disk bytes, taken before
//! any template rendering. A templated file therefore keeps one checksum
//! across environments even though its rendered SQL differs.
//!
//! The combined checksum of a batch hashes the per-file digests concatenated
//! in execution order, so reordering files changes it.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{FilesError, Result};

/// SHA-256 hex digest of arbitrary bytes.
///
/// # Examples
///
/// ```
/// use sqlrun_files::content_checksum;
///
/// assert_eq!(
///     content_checksum(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn content_checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 hex digest of a file's raw bytes.
///
/// # Errors
///
/// Returns [`FilesError::IoError`] if the file cannot be read.
pub fn file_checksum(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| FilesError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content_checksum(&bytes))
}

/// Folds per-file digests into one batch digest.
///
/// Each digest is hashed behind its byte length, so no two distinct
/// sequences share an input stream. Order matters. An empty batch has a
/// defined checksum (the digest of no input).
///
/// # Examples
///
/// ```
/// use sqlrun_files::{combined_checksum, content_checksum};
///
/// let a = content_checksum(b"CREATE TABLE a (id INT);");
/// let b = content_checksum(b"CREATE TABLE b (id INT);");
///
/// assert_eq!(combined_checksum::<String>(&[]), content_checksum(b""));
/// assert_ne!(combined_checksum(&[a.clone()]), combined_checksum(&[a.clone(), b.clone()]));
/// assert_ne!(combined_checksum(&[a.clone(), b.clone()]), combined_checksum(&[b, a]));
/// ```
pub fn combined_checksum<S: AsRef<str>>(digests: &[S]) -> String {
    let mut hasher = Sha256::new();
    for digest in digests {
        let bytes = digest.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    format!("{:x}", hasher.finalize())
}
