mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use gitpulse_git::{CodeActivityStats, GitRepository, StatsError};
use gitpulse_logging::{init_tracing, LogFormat};
use gitpulse_process::ExecContext;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "gitpulse",
    about = "Commit activity and contributor statistics for git repositories",
    version
)]
struct Cli {
    /// Repository to query (default: current directory)
    #[arg(short = 'C', long, global = true)]
    repo: Option<PathBuf>,

    /// Give up after this long, e.g. "30s" or "2m"
    #[arg(long, global = true, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Log output format
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormatChoice>,

    /// Log level or filter directive (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Commits, authors and changed lines since a point in time
    Activity {
        /// Start of the window, inclusive (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_time)]
        since: DateTime<Utc>,

        /// Restrict to one branch (default: all branches)
        #[arg(short, long)]
        branch: Option<String>,
    },
    /// Number of distinct authors on a branch
    Contributors {
        /// Branch to inspect
        #[arg(short, long, default_value = "master")]
        branch: String,

        /// Only count commits after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_time)]
        since: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(time) = DateTime::parse_from_rfc3339(s) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 time or YYYY-MM-DD, got {:?}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let repo_dir = match cli.repo.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = Config::load(&repo_dir)?;

    let log_level = cli
        .log_level
        .as_deref()
        .or(config.log_level.as_deref())
        .unwrap_or("warn");
    let log_format = cli
        .log_format
        .map(LogFormat::from)
        .or(config.log_format)
        .unwrap_or_default();
    init_tracing(log_level, log_format);

    let repo = GitRepository::open_with(&repo_dir, config.repo_options())
        .context("Failed to open repository")?;

    let (mut ctx, cancel) = ExecContext::with_cancel();
    if let Some(timeout) = cli.timeout.or(config.timeout) {
        ctx = ctx.with_timeout(timeout);
    }

    // Handle Ctrl+C by cancelling the running git process
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Stopping git...");
        cancel.cancel();
    })
    .context("Failed to set Ctrl+C handler")?;

    if let Err(e) = run(&cli, &repo, &ctx).await {
        let code = match e.downcast_ref::<StatsError>() {
            Some(StatsError::Cancelled(_)) => 130,
            _ => 1,
        };
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(code);
    }

    Ok(())
}

async fn run(cli: &Cli, repo: &GitRepository, ctx: &ExecContext) -> Result<()> {
    match &cli.command {
        Command::Activity { since, branch } => {
            let stats = repo
                .code_activity_stats(ctx, *since, branch.as_deref())
                .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_activity(repo, &stats, *since, branch.as_deref());
            }
        }
        Command::Contributors { branch, since } => {
            let count = repo.contributor_count(ctx, branch, *since).await?;
            if cli.json {
                let output = serde_json::json!({
                    "branch": branch,
                    "since": since,
                    "contributors": count,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                let window = since
                    .map(|s| format!(" since {}", s.to_rfc3339()))
                    .unwrap_or_default();
                println!(
                    "{} {} {}{}: {}",
                    repo.path().display(),
                    "contributors on".dimmed(),
                    branch.bold(),
                    window.dimmed(),
                    count.to_string().bright_white().bold()
                );
            }
        }
    }
    Ok(())
}

fn print_activity(
    repo: &GitRepository,
    stats: &CodeActivityStats,
    since: DateTime<Utc>,
    branch: Option<&str>,
) {
    println!(
        "{} {} {} {}",
        repo.path().display(),
        "activity since".dimmed(),
        since.to_rfc3339().bold(),
        format!("({})", branch.unwrap_or("all branches")).dimmed()
    );
    println!();
    println!("  Commits:                 {}", stats.commit_count.to_string().bold());
    println!(
        "  Commits in all branches: {}",
        stats.commit_count_in_all_branches
    );
    println!("  Authors:                 {}", stats.author_count);
    println!(
        "  Lines:                   {} {}",
        format!("+{}", stats.additions).green(),
        format!("-{}", stats.deletions).red()
    );

    if stats.authors.is_empty() {
        return;
    }

    println!();
    let width = stats
        .authors
        .iter()
        .map(|a| a.commits.to_string().len())
        .max()
        .unwrap_or(1);
    for author in &stats.authors {
        println!(
            "  {:>width$}  {} {}",
            author.commits.to_string().bright_white(),
            author.name,
            format!("<{}>", author.email).dimmed(),
            width = width
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_time_formats() {
        let expected = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_time("2016-01-01T00:00:00Z"), Ok(expected));
        assert_eq!(parse_time("2016-01-01T01:00:00+01:00"), Ok(expected));
        assert_eq!(parse_time("2016-01-01"), Ok(expected));
        assert!(parse_time("last tuesday").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "gitpulse",
            "activity",
            "--since",
            "2016-01-01",
            "--branch",
            "master",
            "--timeout",
            "30s",
        ])
        .unwrap();

        assert_eq!(cli.timeout, Some(Duration::from_secs(30)));
        assert!(matches!(
            cli.command,
            Command::Activity { branch: Some(ref b), .. } if b == "master"
        ));

        let cli = Cli::try_parse_from(["gitpulse", "contributors", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Command::Contributors { ref branch, since: None } if branch == "master"
        ));
    }
}
