use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitpulse_process::{BoxError, ConsumeFlow, ExecContext, OutputConsumer};
use std::collections::HashSet;
use tokio::io::AsyncBufRead;
use tracing::info;

use crate::parser::{CommitStream, LOG_FORMAT};
use crate::repository::{since_exclusive, validate_ref};
use crate::{GitRepository, StatsError};

/// Distinct author emails, optionally capped
#[derive(Debug, Default)]
struct ContributorConsumer {
    emails: HashSet<String>,
    /// Stop reading once this many distinct authors are seen
    limit: Option<usize>,
}

#[async_trait]
impl OutputConsumer for ContributorConsumer {
    async fn consume(
        &mut self,
        stdout: &mut (dyn AsyncBufRead + Unpin + Send),
    ) -> Result<ConsumeFlow, BoxError> {
        let mut stream = CommitStream::new(stdout);
        while let Some(record) = stream.next_record().await? {
            self.emails.insert(record.author_email);
            if self.limit.is_some_and(|limit| self.emails.len() >= limit) {
                return Ok(ConsumeFlow::Stopped);
            }
        }
        Ok(ConsumeFlow::Drained)
    }
}

impl GitRepository {
    /// Number of distinct author emails on `branch` with commit time strictly
    /// after `since`. `None` counts the whole branch. An unknown branch is an
    /// error, a `since` after the last commit is zero.
    pub async fn contributor_count(
        &self,
        ctx: &ExecContext,
        branch: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<usize, StatsError> {
        let mut consumer = ContributorConsumer::default();
        self.collect_contributors(ctx, branch, since, &mut consumer)
            .await?;

        let count = consumer.emails.len();
        info!(branch, since = ?since, contributors = count, "Counted contributors");
        Ok(count)
    }

    /// Whether at least `n` distinct authors committed to `branch` after
    /// `since`. Stops reading the log as soon as the answer is known.
    pub async fn has_contributors(
        &self,
        ctx: &ExecContext,
        branch: &str,
        since: Option<DateTime<Utc>>,
        n: usize,
    ) -> Result<bool, StatsError> {
        if n == 0 {
            validate_ref(branch)?;
            return Ok(true);
        }

        let mut consumer = ContributorConsumer {
            limit: Some(n),
            ..Default::default()
        };
        self.collect_contributors(ctx, branch, since, &mut consumer)
            .await?;
        Ok(consumer.emails.len() >= n)
    }

    async fn collect_contributors(
        &self,
        ctx: &ExecContext,
        branch: &str,
        since: Option<DateTime<Utc>>,
        consumer: &mut ContributorConsumer,
    ) -> Result<(), StatsError> {
        validate_ref(branch)?;

        let mut spec = self.merge_filter(self.git().args(["log", LOG_FORMAT]));
        if let Some(since) = since {
            spec = spec.arg(since_exclusive(since));
        }
        let spec = spec.arg(branch).arg("--");

        self.run_git(ctx, spec, consumer).await
    }
}
