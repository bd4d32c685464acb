//! # gitpulse-git
//!
//! Repository statistics computed from `git log` output.
//!
//! ## Overview
//!
//! Each query runs git as a subprocess and parses its output while git is
//! still writing, so memory stays flat however long the history is:
//! - [`GitRepository::code_activity_stats`] - commits, authors and line
//!   counts since a point in time
//! - [`GitRepository::contributor_count`] - distinct authors on a branch
//!
//! ## Key Types
//!
//! - [`GitRepository`] - Handle to the repository on disk
//! - [`CodeActivityStats`] / [`CodeActivityAuthor`] - Activity results
//! - [`CommitStream`] - Lazy parser over log output
//! - [`StatsError`] - `Config`, `Query` or `Cancelled`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gitpulse_git::GitRepository;
//! use gitpulse_process::ExecContext;
//! use std::time::Duration;
//!
//! let repo = GitRepository::open("/srv/repos/project.git")?;
//! let ctx = ExecContext::background().with_timeout(Duration::from_secs(30));
//!
//! let stats = repo.code_activity_stats(&ctx, since, None).await?;
//! println!("{} commits by {} authors", stats.commit_count, stats.author_count);
//!
//! let contributors = repo.contributor_count(&ctx, "master", None).await?;
//! ```
//!
//! ## Errors
//!
//! A git process that was killed (cancelled context, deadline, or an outside
//! SIGKILL) yields [`StatsError::Cancelled`], never partial statistics.

mod activity;
mod contributors;
mod error;
mod parser;
mod repository;

pub use activity::{ActivityAccumulator, CodeActivityAuthor, CodeActivityStats};
pub use error::{ParseError, StatsError};
pub use parser::{CommitRecord, CommitStream, LOG_FORMAT};
pub use repository::{GitRepository, RepoOptions};
