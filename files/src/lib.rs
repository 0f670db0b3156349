//! SQL file discovery, content checksums, and project configuration.
//!
//! This crate covers the leaf concerns of sqlrun that only touch the
//! filesystem:
//!
//! - **discovery**: recursive, deterministically ordered listing of `.sql`
//!   and `.sql.tmpl` files ([`discover_files`]).
//! - **checksums**: SHA-256 fingerprints of raw file bytes and of whole
//!   batches ([`file_checksum`], [`combined_checksum`]).
//! - **config**: the YAML project configuration ([`ProjectConfig`]).
//!
//! # Quick start
//!
//! ```no_run
//! use sqlrun_files::{ProjectConfig, combined_checksum, discover_files, file_checksum};
//!
//! let config = ProjectConfig::load("sqlrun.yml").unwrap();
//! let files = discover_files(&config.paths.sql).unwrap();
//! let digests: Vec<String> = files.iter().map(|f| file_checksum(f).unwrap()).collect();
//! println!("{} files, batch checksum {}", files.len(), combined_checksum(&digests));
//! ```

mod checksum;
mod config;
mod discover;
mod error;

pub use checksum::{combined_checksum, content_checksum, file_checksum};
pub use config::{
    DEFAULT_CONFIG_FILE, IdentityConfig, LedgerConfig, PathsConfig, ProjectConfig, RunnerConfig,
};
pub use discover::{
    SQL_EXTENSION, TEMPLATE_EXTENSION, discover_files, is_sql_file, is_template_file,
    strip_template_suffix,
};
pub use error::{FilesError, Result};
