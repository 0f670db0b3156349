//! Who is running the operation, recorded as `executed_by`.

use std::fmt;

use sqlrun_files::IdentityConfig;

/// Display identity of the person or process running a batch.
///
/// # Examples
///
/// ```
/// use sqlrun_engine::Identity;
///
/// let ada = Identity::new("Ada", Some("ada@example.com".to_string()));
/// assert_eq!(ada.to_string(), "Ada <ada@example.com>");
/// assert_eq!(Identity::new("ci", None).to_string(), "ci");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: Option<String>) -> Self {
        Self {
            name: name.into(),
            email,
        }
    }

    /// Resolves from config, then `$USER` / `$USERNAME`, then `unknown`.
    pub fn resolve(config: Option<&IdentityConfig>) -> Self {
        Self::resolve_with(config, |key| std::env::var(key).ok())
    }

    fn resolve_with(config: Option<&IdentityConfig>, env: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(config) = config.filter(|c| !c.name.trim().is_empty()) {
            return Self::new(config.name.clone(), config.email.clone());
        }
        let name = ["USER", "USERNAME"]
            .into_iter()
            .filter_map(&env)
            .find(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        Self::new(name, None)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.email {
            Some(email) if !email.is_empty() => write!(f, "{} <{}>", self.name, email),
            _ => write!(f, "{}", self.name),
        }
    }
}
