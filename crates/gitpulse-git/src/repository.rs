use chrono::{DateTime, Utc};
use gitpulse_process::{
    CommandSpec, ExecContext, OutputConsumer, ProcessOutcome, ProcessRunner,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::StatsError;

/// How the repository is queried
#[derive(Debug, Clone)]
pub struct RepoOptions {
    /// git executable (looked up on PATH when relative)
    pub git_binary: PathBuf,
    /// Time a cancelled git process gets to exit before it is killed
    pub grace_period: Duration,
    /// Count merge commits (default: skip them with `--no-merges`)
    pub include_merges: bool,
}

impl Default for RepoOptions {
    fn default() -> Self {
        Self {
            git_binary: PathBuf::from("git"),
            grace_period: ProcessRunner::DEFAULT_GRACE_PERIOD,
            include_merges: false,
        }
    }
}

/// Handle to an on-disk repository (bare or with a work tree).
///
/// Holds no state between calls; every query spawns its own git process.
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
    options: RepoOptions,
    runner: ProcessRunner,
}

impl GitRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StatsError> {
        Self::open_with(path, RepoOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: RepoOptions) -> Result<Self, StatsError> {
        let path = path.as_ref();

        if !path.is_dir() {
            return Err(StatsError::Config(format!(
                "repository path is not a directory: {}",
                path.display()
            )));
        }

        let has_work_tree = path.join(".git").exists();
        let is_bare = path.join("HEAD").is_file() && path.join("objects").is_dir();
        if !has_work_tree && !is_bare {
            return Err(StatsError::Config(format!(
                "not a git repository: {}",
                path.display()
            )));
        }

        debug!(path = %path.display(), bare = is_bare && !has_work_tree, "Opened repository");

        let runner = ProcessRunner::new().with_grace_period(options.grace_period);
        Ok(Self {
            path: path.to_path_buf(),
            options,
            runner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `git -C <repo>` ready for subcommand arguments
    pub(crate) fn git(&self) -> CommandSpec {
        CommandSpec::new(&self.options.git_binary)
            .arg("-C")
            .arg(self.path.as_os_str())
    }

    pub(crate) fn merge_filter(&self, spec: CommandSpec) -> CommandSpec {
        if self.options.include_merges {
            spec
        } else {
            spec.arg("--no-merges")
        }
    }

    /// Run a git command and turn anything but success into a [`StatsError`]
    pub(crate) async fn run_git(
        &self,
        ctx: &ExecContext,
        spec: CommandSpec,
        consumer: &mut dyn OutputConsumer,
    ) -> Result<(), StatsError> {
        match self.runner.run(&spec, ctx, consumer).await? {
            ProcessOutcome::Success => Ok(()),
            ProcessOutcome::Killed(reason) => Err(StatsError::Cancelled(reason)),
            ProcessOutcome::Failed { exit_code, stderr } => {
                let code = exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                Err(StatsError::Query(format!(
                    "git {} exited with {}: {}",
                    subcommand(&spec),
                    code,
                    stderr
                )))
            }
        }
    }
}

fn subcommand(spec: &CommandSpec) -> String {
    // Skip `-C <path>`
    spec.args
        .get(2)
        .map(|a| a.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Ref names go on the command line as-is; refuse anything git would read as an option
pub(crate) fn validate_ref(name: &str) -> Result<(), StatsError> {
    if name.is_empty() || name.starts_with('-') {
        return Err(StatsError::Query(format!("invalid ref name: {:?}", name)));
    }
    Ok(())
}

/// `--since` is inclusive in git and git times are whole seconds, so round up
pub(crate) fn since_inclusive(since: DateTime<Utc>) -> String {
    let secs = since.timestamp() + i64::from(since.timestamp_subsec_nanos() > 0);
    format!("--since=@{}", secs)
}

/// Smallest whole second strictly after `since`
pub(crate) fn since_exclusive(since: DateTime<Utc>) -> String {
    format!("--since=@{}", since.timestamp() + 1)
}
