use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, warn};

use crate::termination;
use crate::{
    BoxError, CommandSpec, ConsumeFlow, ExecContext, OutputConsumer, ProcessError, ProcessOutcome,
};

/// Runs one subprocess per call, streaming its stdout into a consumer
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// How long a cancelled process may take to exit before it is killed
    grace_period: Duration,
}

/// How long a child may take to exit after its consumer failed
const EXIT_AFTER_CONSUMER_ERROR: Duration = Duration::from_millis(200);

enum Finished {
    Consumed(ConsumeFlow),
    ConsumerFailed(BoxError),
    Cancelled(crate::KillReason),
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

    pub fn new() -> Self {
        Self {
            grace_period: Self::DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Spawn `spec`, feed its stdout to `consumer`, and classify how it ended.
    ///
    /// The child is reaped on every path out of this function.
    pub async fn run(
        &self,
        spec: &CommandSpec,
        ctx: &ExecContext,
        consumer: &mut dyn OutputConsumer,
    ) -> Result<ProcessOutcome, ProcessError> {
        if let Some(reason) = ctx.is_done() {
            debug!(program = %spec.program.display(), %reason, "Context done before spawn");
            return Ok(ProcessOutcome::Killed(reason));
        }

        let start = Instant::now();

        debug!(
            program = %spec.program.display(),
            args = ?spec.args,
            working_dir = ?spec.working_dir,
            "Spawning process"
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProcessError::NotFound(spec.program_name()),
            _ => ProcessError::SpawnFailed(e),
        })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            force_kill(&mut child).await;
            return Err(ProcessError::Io(std::io::Error::other(
                "process pipes were not captured",
            )));
        };

        // Drained on its own task so a chatty stderr cannot block the child
        let stderr_task = tokio::spawn(read_stderr(stderr));
        let mut stdout = BufReader::new(stdout);

        let finished = tokio::select! {
            reason = ctx.done() => Finished::Cancelled(reason),
            result = consumer.consume(&mut stdout) => match result {
                Ok(flow) => Finished::Consumed(flow),
                Err(e) => Finished::ConsumerFailed(e),
            },
        };
        drop(stdout);

        let status = match finished {
            Finished::Cancelled(reason) => {
                self.terminate(&mut child).await;
                stderr_task.abort();
                debug!(%reason, duration_ms = start.elapsed().as_millis(), "Process cancelled");
                return Ok(ProcessOutcome::Killed(reason));
            }
            Finished::ConsumerFailed(e) => {
                stderr_task.abort();
                // Output cut short by a kill usually surfaces as a parse error
                // at EOF, by which time the child is already gone
                match tokio::time::timeout(EXIT_AFTER_CONSUMER_ERROR, child.wait()).await {
                    Ok(Ok(status)) if termination::was_killed(Some(&status)) => {
                        debug!(
                            error = %e,
                            duration_ms = start.elapsed().as_millis(),
                            "Process killed mid-stream"
                        );
                        return Ok(ProcessOutcome::Killed(crate::KillReason::Signal));
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(_)) | Err(_) => force_kill(&mut child).await,
                }
                return Err(ProcessError::Consumer(e));
            }
            Finished::Consumed(ConsumeFlow::Stopped) => {
                force_kill(&mut child).await;
                stderr_task.abort();
                debug!(
                    duration_ms = start.elapsed().as_millis(),
                    "Consumer stopped early, process killed"
                );
                return Ok(ProcessOutcome::Success);
            }
            Finished::Consumed(ConsumeFlow::Drained) => {
                tokio::select! {
                    reason = ctx.done() => {
                        self.terminate(&mut child).await;
                        stderr_task.abort();
                        return Ok(ProcessOutcome::Killed(reason));
                    }
                    status = child.wait() => status?,
                }
            }
        };

        let stderr = stderr_task.await.unwrap_or_else(|e| {
            warn!(error = %e, "stderr reader task failed");
            String::new()
        });

        debug!(
            exit_code = status.code().unwrap_or(-1),
            duration_ms = start.elapsed().as_millis(),
            "Process completed"
        );

        if status.success() {
            Ok(ProcessOutcome::Success)
        } else if termination::was_killed(Some(&status)) {
            Ok(ProcessOutcome::Killed(crate::KillReason::Signal))
        } else {
            Ok(ProcessOutcome::Failed {
                exit_code: status.code(),
                stderr,
            })
        }
    }

    /// Stdout is already closed, so a writing child sees a broken pipe.
    /// Give it the grace period to exit, then kill it.
    ///
    /// A child that is not writing (e.g. `rev-list --count` still walking
    /// history) never sees the closed pipe and always costs the full grace
    /// period before the kill.
    async fn terminate(&self, child: &mut Child) {
        if tokio::time::timeout(self.grace_period, child.wait())
            .await
            .is_err()
        {
            debug!(
                grace_ms = self.grace_period.as_millis(),
                "Process outlived grace period, killing"
            );
            force_kill(child).await;
        }
    }
}

async fn force_kill(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "start_kill failed, process likely already exited");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap killed process");
    }
}

async fn read_stderr(mut stderr: ChildStderr) -> String {
    let mut buf = Vec::new();
    if let Err(e) = stderr.read_to_end(&mut buf).await {
        debug!(error = %e, "Failed to read stderr");
    }
    String::from_utf8_lossy(&buf).trim_end().to_string()
}
