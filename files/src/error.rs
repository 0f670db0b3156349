//! Error types for file discovery, checksums, and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading project files.
#[derive(Debug, Error)]
pub enum FilesError {
    /// A directory could not be listed during discovery.
    #[error("cannot read directory '{}': {source}", path.display())]
    DiscoveryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be read (checksum or load).
    #[error("cannot read file '{}': {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Configuration is structurally valid YAML but semantically wrong.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for results with [`FilesError`].
pub type Result<T> = std::result::Result<T, FilesError>;
