use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitpulse_process::{BoxError, CollectOutput, ConsumeFlow, ExecContext, OutputConsumer};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufRead;
use tracing::{info, trace};

use crate::parser::{CommitRecord, CommitStream, LOG_FORMAT};
use crate::repository::{since_inclusive, validate_ref};
use crate::{GitRepository, StatsError};

/// Commits attributed to one author email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeActivityAuthor {
    pub email: String,
    /// Display name from the author's first commit in the window
    pub name: String,
    pub commits: u64,
}

/// Commit activity in a time window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeActivityStats {
    pub commit_count: u64,
    pub author_count: u64,
    /// Commits reachable from any branch in the same window
    pub commit_count_in_all_branches: u64,
    pub additions: u64,
    pub deletions: u64,
    /// Most commits first; ties keep the order authors first appeared in
    pub authors: Vec<CodeActivityAuthor>,
}

/// Folds commit records into [`CodeActivityStats`]
#[derive(Debug, Default)]
pub struct ActivityAccumulator {
    commit_count: u64,
    additions: u64,
    deletions: u64,
    authors: IndexMap<String, CodeActivityAuthor>,
}

impl ActivityAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: &CommitRecord) {
        self.commit_count += 1;
        self.additions += record.additions;
        self.deletions += record.deletions;

        self.authors
            .entry(record.author_email.clone())
            .or_insert_with(|| CodeActivityAuthor {
                email: record.author_email.clone(),
                name: record.author_name.clone(),
                commits: 0,
            })
            .commits += 1;
    }

    /// `all_branches` is the separately counted all-branches total, or None
    /// when the records already covered every branch.
    pub fn finish(self, all_branches: Option<u64>) -> CodeActivityStats {
        let mut authors: Vec<CodeActivityAuthor> = self.authors.into_values().collect();
        // Stable sort keeps first-seen order among equal counts
        authors.sort_by(|a, b| b.commits.cmp(&a.commits));

        CodeActivityStats {
            commit_count: self.commit_count,
            author_count: authors.len() as u64,
            commit_count_in_all_branches: all_branches.unwrap_or(self.commit_count),
            additions: self.additions,
            deletions: self.deletions,
            authors,
        }
    }
}

#[derive(Default)]
struct ActivityConsumer {
    accumulator: ActivityAccumulator,
}

#[async_trait]
impl OutputConsumer for ActivityConsumer {
    async fn consume(
        &mut self,
        stdout: &mut (dyn AsyncBufRead + Unpin + Send),
    ) -> Result<ConsumeFlow, BoxError> {
        let mut stream = CommitStream::new(stdout);
        while let Some(record) = stream.next_record().await? {
            trace!(hash = %record.hash, author = %record.author_email, "commit");
            self.accumulator.add(&record);
        }
        Ok(ConsumeFlow::Drained)
    }
}

impl GitRepository {
    /// Commit activity since `since` (inclusive).
    ///
    /// With a `branch`, commits are those on its first-parent history and a
    /// second query counts commits across all branches. Without one, a single
    /// pass over all branches yields both counts.
    pub async fn code_activity_stats(
        &self,
        ctx: &ExecContext,
        since: DateTime<Utc>,
        branch: Option<&str>,
    ) -> Result<CodeActivityStats, StatsError> {
        let branch = branch.filter(|b| !b.is_empty());
        if let Some(branch) = branch {
            validate_ref(branch)?;
        }

        let spec = self
            .git()
            .args(["log", "--numstat", LOG_FORMAT])
            .arg(since_inclusive(since));
        let spec = self.merge_filter(spec);
        let spec = match branch {
            Some(branch) => spec.arg("--first-parent").arg(branch).arg("--"),
            None => spec.arg("--branches=*"),
        };

        let mut consumer = ActivityConsumer::default();
        self.run_git(ctx, spec, &mut consumer).await?;

        let all_branches = match branch {
            Some(_) => Some(self.commit_count_all_branches(ctx, since).await?),
            None => None,
        };

        let stats = consumer.accumulator.finish(all_branches);

        info!(
            branch = branch.unwrap_or("*"),
            since = %since,
            commits = stats.commit_count,
            authors = stats.author_count,
            all_branches = stats.commit_count_in_all_branches,
            "Computed code activity"
        );

        Ok(stats)
    }

    async fn commit_count_all_branches(
        &self,
        ctx: &ExecContext,
        since: DateTime<Utc>,
    ) -> Result<u64, StatsError> {
        let spec = self.git().args(["rev-list", "--count"]);
        let spec = self
            .merge_filter(spec)
            .arg("--branches=*")
            .arg(since_inclusive(since));

        let mut output = CollectOutput::default();
        self.run_git(ctx, spec, &mut output).await?;

        output.stdout.trim().parse().map_err(|_| {
            StatsError::Query(format!(
                "unexpected rev-list output: {:?}",
                output.stdout.trim()
            ))
        })
    }
}
