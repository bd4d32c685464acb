//! Configuration file support for gitpulse.
//!
//! Reads the user file `<config dir>/gitpulse/config.toml`, then overlays
//! `gitpulse.toml` from the repository directory. The repository file is
//! not allowed to choose the git executable.

use anyhow::{bail, Context, Result};
use gitpulse_git::RepoOptions;
use gitpulse_logging::LogFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings loaded from a config file; every field is optional
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// git executable to run; user config only
    pub git_binary: Option<PathBuf>,
    /// Deadline for each command, e.g. "30s"
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Time a cancelled git process gets before it is killed
    #[serde(default, with = "humantime_serde")]
    pub grace_period: Option<Duration>,
    /// Count merge commits
    pub include_merges: Option<bool>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

/// The per-repository config file name
pub const CONFIG_FILE_NAME: &str = "gitpulse.toml";

impl Config {
    /// Load the user config, then overlay the repository config.
    ///
    /// A missing file contributes nothing. A file that exists but fails to
    /// parse is a hard error, as is a repository file setting `git_binary`.
    pub fn load(repo_dir: &Path) -> Result<Self> {
        Self::load_layered(repo_dir, user_config_path().as_deref())
    }

    fn load_layered(repo_dir: &Path, user_path: Option<&Path>) -> Result<Self> {
        let user = match user_path {
            Some(path) if path.exists() => Self::load_file(path)?,
            _ => Self::default(),
        };

        let repo_path = repo_dir.join(CONFIG_FILE_NAME);
        if !repo_path.exists() {
            return Ok(user);
        }
        let repo = Self::load_file(&repo_path)?;
        if repo.git_binary.is_some() {
            bail!(
                "{}: git_binary may only be set in the user config file",
                repo_path.display()
            );
        }
        Ok(user.overlay(repo))
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Fields set in `other` win
    fn overlay(self, other: Self) -> Self {
        Self {
            git_binary: other.git_binary.or(self.git_binary),
            timeout: other.timeout.or(self.timeout),
            grace_period: other.grace_period.or(self.grace_period),
            include_merges: other.include_merges.or(self.include_merges),
            log_level: other.log_level.or(self.log_level),
            log_format: other.log_format.or(self.log_format),
        }
    }

    pub fn repo_options(&self) -> RepoOptions {
        let defaults = RepoOptions::default();
        RepoOptions {
            git_binary: self.git_binary.clone().unwrap_or(defaults.git_binary),
            grace_period: self.grace_period.unwrap_or(defaults.grace_period),
            include_merges: self.include_merges.unwrap_or(defaults.include_merges),
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gitpulse").join("config.toml"))
}
