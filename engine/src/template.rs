//! Template rendering for `.sql.tmpl` files.
//!
//! The runner only sees the [`TemplateEngine`] trait. [`VarTemplates`] is
//! the bundled implementation: plain `{{ name }}` substitution with no
//! control flow, so rendering is a pure function of the file and config.
//!
//! Recognized names:
//!
//! - `{{ project_root }}`: the project root directory
//! - `{{ name }}`: a value from the config's `vars`
//! - `{{ secrets.name }}`: a value from the config's `secrets`
//! - `{{ global_secrets.name }}`: a value from `global_secrets`
//!
//! Any other name is a rendering error; nothing is silently left blank.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use regex::{Captures, Regex};
use sqlrun_files::{ProjectConfig, is_template_file};
use thiserror::Error;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)\s*\}\}")
        .expect("static regex must compile")
});

/// Errors produced while rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("cannot read template '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown template variable '{name}' in '{}'", path.display())]
    UnknownVariable { path: PathBuf, name: String },
}

/// Inputs available to a template.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub project_root: &'a Path,
    pub config: &'a ProjectConfig,
    pub secrets: &'a BTreeMap<String, String>,
    pub global_secrets: &'a BTreeMap<String, String>,
}

impl<'a> RenderContext<'a> {
    /// A context whose secrets come from the config itself.
    pub fn new(project_root: &'a Path, config: &'a ProjectConfig) -> Self {
        Self {
            project_root,
            config,
            secrets: &config.secrets,
            global_secrets: &config.global_secrets,
        }
    }
}

/// Output of rendering one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub sql: String,
    pub duration_ms: u64,
}

/// Turns a template file into executable SQL.
///
/// Implementations must be pure given identical inputs; checksums are
/// taken of the source file, so hidden state would make them meaningless.
pub trait TemplateEngine {
    fn is_template(&self, path: &Path) -> bool;

    fn process_file(
        &self,
        path: &Path,
        ctx: &RenderContext<'_>,
    ) -> Result<Rendered, TemplateError>;
}

/// `{{ name }}` substitution from config vars and secrets.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sqlrun_engine::{RenderContext, VarTemplates};
/// use sqlrun_files::ProjectConfig;
///
/// let mut config = ProjectConfig::new("dev", "dev.db");
/// config.vars.insert("schema".into(), "app".into());
///
/// let ctx = RenderContext::new(Path::new("/srv/project"), &config);
/// let sql = VarTemplates.render_str(Path::new("v.sql.tmpl"), "CREATE SCHEMA {{ schema }};", &ctx);
/// assert_eq!(sql.unwrap(), "CREATE SCHEMA app;");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct VarTemplates;

impl VarTemplates {
    /// Renders template text already in memory. `path` is only used in errors.
    pub fn render_str(
        &self,
        path: &Path,
        source: &str,
        ctx: &RenderContext<'_>,
    ) -> Result<String, TemplateError> {
        let mut unknown = None;
        let rendered = PLACEHOLDER_RE.replace_all(source, |caps: &Captures<'_>| {
            let name = &caps[1];
            match lookup(name, ctx) {
                Some(value) => value,
                None => {
                    unknown.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });

        match unknown {
            Some(name) => Err(TemplateError::UnknownVariable {
                path: path.to_path_buf(),
                name,
            }),
            None => Ok(rendered.into_owned()),
        }
    }
}

impl TemplateEngine for VarTemplates {
    fn is_template(&self, path: &Path) -> bool {
        is_template_file(path)
    }

    fn process_file(
        &self,
        path: &Path,
        ctx: &RenderContext<'_>,
    ) -> Result<Rendered, TemplateError> {
        let started = Instant::now();
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let sql = self.render_str(path, &source, ctx)?;
        Ok(Rendered {
            sql,
            duration_ms: crate::elapsed_ms(started),
        })
    }
}

fn lookup(name: &str, ctx: &RenderContext<'_>) -> Option<String> {
    if name == "project_root" {
        return Some(ctx.project_root.display().to_string());
    }
    match name.split_once('.') {
        Some(("secrets", key)) => ctx.secrets.get(key).cloned(),
        Some(("global_secrets", key)) => ctx.global_secrets.get(key).cloned(),
        Some(_) => None,
        None => ctx.config.vars.get(name).cloned(),
    }
}
