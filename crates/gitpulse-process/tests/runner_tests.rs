#![cfg(unix)]

use std::time::{Duration, Instant};

use async_trait::async_trait;
use gitpulse_process::{
    BoxError, CollectOutput, CommandSpec, ConsumeFlow, DiscardOutput, ExecContext, KillReason,
    OutputConsumer, ProcessError, ProcessOutcome, ProcessRunner,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh").arg("-c").arg(script)
}

fn runner() -> ProcessRunner {
    ProcessRunner::new().with_grace_period(Duration::from_millis(200))
}

/// Takes the first `limit` lines, then stops
struct FirstLines {
    limit: usize,
    lines: Vec<String>,
}

#[async_trait]
impl OutputConsumer for FirstLines {
    async fn consume(
        &mut self,
        stdout: &mut (dyn AsyncBufRead + Unpin + Send),
    ) -> Result<ConsumeFlow, BoxError> {
        let mut lines = stdout.lines();
        while let Some(line) = lines.next_line().await? {
            self.lines.push(line);
            if self.lines.len() == self.limit {
                return Ok(ConsumeFlow::Stopped);
            }
        }
        Ok(ConsumeFlow::Drained)
    }
}

struct FailsImmediately;

#[async_trait]
impl OutputConsumer for FailsImmediately {
    async fn consume(
        &mut self,
        _stdout: &mut (dyn AsyncBufRead + Unpin + Send),
    ) -> Result<ConsumeFlow, BoxError> {
        Err("bad record".into())
    }
}

/// Reads everything, then rejects it as truncated
struct FailsAtEof;

#[async_trait]
impl OutputConsumer for FailsAtEof {
    async fn consume(
        &mut self,
        stdout: &mut (dyn AsyncBufRead + Unpin + Send),
    ) -> Result<ConsumeFlow, BoxError> {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await?;
        Err(format!("truncated record after {} bytes", buf.len()).into())
    }
}

// ============================================================
// Completion
// ============================================================

#[tokio::test]
async fn test_success_streams_stdout() {
    let mut out = CollectOutput::default();
    let outcome = runner()
        .run(&sh("printf 'a\\nb\\n'"), &ExecContext::background(), &mut out)
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Success);
    assert_eq!(out.stdout, "a\nb\n");
}

#[tokio::test]
async fn test_nonzero_exit_is_failed_with_stderr() {
    let outcome = runner()
        .run(
            &sh("echo 'fatal: bad revision' >&2; exit 128"),
            &ExecContext::background(),
            &mut DiscardOutput,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ProcessOutcome::Failed {
            exit_code: Some(128),
            stderr: "fatal: bad revision".to_string(),
        }
    );
}

#[tokio::test]
async fn test_missing_executable_is_not_found() {
    let err = runner()
        .run(
            &CommandSpec::new("/definitely/not/a/real/binary"),
            &ExecContext::background(),
            &mut DiscardOutput,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::NotFound(_)), "{err:?}");
}

#[tokio::test]
async fn test_working_dir_is_applied() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut out = CollectOutput::default();
    runner()
        .run(
            &CommandSpec::new("pwd").current_dir(dir.path()),
            &ExecContext::background(),
            &mut out,
        )
        .await
        .unwrap();

    let expected = dir.path().canonicalize().unwrap();
    let actual = std::path::Path::new(out.stdout.trim()).canonicalize().unwrap();
    assert_eq!(actual, expected);
}

// ============================================================
// Kills and cancellation
// ============================================================

#[tokio::test]
async fn test_external_sigkill_is_killed() {
    let outcome = runner()
        .run(&sh("kill -9 $$"), &ExecContext::background(), &mut DiscardOutput)
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Killed(KillReason::Signal));
}

#[tokio::test]
async fn test_sigterm_is_failure_not_kill() {
    let outcome = runner()
        .run(&sh("kill -15 $$"), &ExecContext::background(), &mut DiscardOutput)
        .await
        .unwrap();

    assert!(
        matches!(outcome, ProcessOutcome::Failed { exit_code: None, .. }),
        "{outcome:?}"
    );
}

#[tokio::test]
async fn test_deadline_kills_silent_process_promptly() {
    let ctx = ExecContext::background().with_timeout(Duration::from_millis(100));
    let start = Instant::now();

    let outcome = runner()
        .run(&sh("sleep 30"), &ctx, &mut DiscardOutput)
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Killed(KillReason::DeadlineExceeded));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_cancel_handle_kills_process() {
    let (ctx, handle) = ExecContext::with_cancel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let outcome = runner()
        .run(&sh("while true; do echo tick; done"), &ctx, &mut DiscardOutput)
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Killed(KillReason::Cancelled));
}

#[tokio::test]
async fn test_already_cancelled_context_does_not_spawn() {
    let (ctx, handle) = ExecContext::with_cancel();
    handle.cancel();

    // Would fail with NotFound if it were spawned
    let outcome = runner()
        .run(&CommandSpec::new("/no/such/binary"), &ctx, &mut DiscardOutput)
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Killed(KillReason::Cancelled));
}

// ============================================================
// Consumer behaviour
// ============================================================

#[tokio::test]
async fn test_consumer_stopping_early_is_success() {
    let mut first = FirstLines {
        limit: 3,
        lines: Vec::new(),
    };
    let outcome = runner()
        .run(&sh("yes line"), &ExecContext::background(), &mut first)
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Success);
    assert_eq!(first.lines, vec!["line", "line", "line"]);
}

#[tokio::test]
async fn test_consumer_error_surfaces_and_reaps() {
    let start = Instant::now();
    let err = runner()
        .run(&sh("sleep 30"), &ExecContext::background(), &mut FailsImmediately)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Consumer(_)), "{err:?}");
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_kill_mid_record_wins_over_consumer_error() {
    let outcome = runner()
        .run(
            &sh("printf 'partial'; kill -9 $$"),
            &ExecContext::background(),
            &mut FailsAtEof,
        )
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Killed(KillReason::Signal));
}

#[tokio::test]
async fn test_consumer_error_after_clean_exit_is_reported() {
    let err = runner()
        .run(&sh("printf 'partial'"), &ExecContext::background(), &mut FailsAtEof)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Consumer(_)), "{err:?}");
}
