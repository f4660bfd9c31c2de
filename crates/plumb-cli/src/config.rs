//! User configuration.
//!
//! Read from `<config dir>/plumb/config.toml` when present, then
//! overridden by `PLUMB_*` environment variables.

use crate::commands::{CliError, Result};
use plumb_git::plumbing::{CloneOptions, DEFAULT_BRANCH, DEFAULT_METADATA_DIR};
use plumb_git::Signature;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Commit identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Author and committer name.
    pub name: String,
    /// Author and committer email.
    pub email: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: Signature::DEFAULT_NAME.to_string(),
            email: Signature::DEFAULT_EMAIL.to_string(),
        }
    }
}

/// Configuration for the plumb CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Commit identity.
    pub user: UserConfig,
    /// Branch for new repositories and for clones of remotes without a HEAD symref.
    pub default_branch: String,
    /// User agent sent to HTTP remotes.
    pub user_agent: String,
    /// Name of the repository metadata directory.
    pub metadata_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user: UserConfig::default(),
            default_branch: DEFAULT_BRANCH.to_string(),
            user_agent: format!("plumb/{}", env!("CARGO_PKG_VERSION")),
            metadata_dir: DEFAULT_METADATA_DIR.to_string(),
        }
    }
}

impl Config {
    /// Loads the config file (if any) and applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::from_toml(&std::fs::read_to_string(&path)?)?
            }
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parses a config file body.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| CliError::Config(e.to_string()))
    }

    /// Applies `PLUMB_*` overrides looked up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fields: [(&str, &mut String); 5] = [
            ("PLUMB_AUTHOR_NAME", &mut self.user.name),
            ("PLUMB_AUTHOR_EMAIL", &mut self.user.email),
            ("PLUMB_DEFAULT_BRANCH", &mut self.default_branch),
            ("PLUMB_USER_AGENT", &mut self.user_agent),
            ("PLUMB_DIR", &mut self.metadata_dir),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *field = value;
            }
        }
    }

    /// Identity used for new commits.
    pub fn signature(&self) -> Signature {
        Signature::new(&self.user.name, &self.user.email)
    }

    /// Clone options for an optional explicit branch.
    pub fn clone_options(&self, branch: Option<String>) -> CloneOptions {
        CloneOptions {
            branch,
            default_branch: self.default_branch.clone(),
            metadata_dir: self.metadata_dir.clone(),
        }
    }
}

/// Get config file path.
fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("plumb").join("config.toml"))
}
