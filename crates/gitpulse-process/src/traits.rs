use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncBufRead;

/// Boxed error returned by an [`OutputConsumer`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that prevent a process run from producing an outcome
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Executable not found: {0}")]
    NotFound(String),

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Process I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output consumer failed: {0}")]
    Consumer(#[source] BoxError),
}

/// An executable plus its literal argument vector
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Working directory (None = inherit)
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub(crate) fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// What the consumer did with the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeFlow {
    /// Read until end of stream
    Drained,
    /// Stopped early; the rest of the output is not needed
    Stopped,
}

/// Reads a process's stdout while the process is still running
#[async_trait]
pub trait OutputConsumer: Send {
    async fn consume(
        &mut self,
        stdout: &mut (dyn AsyncBufRead + Unpin + Send),
    ) -> Result<ConsumeFlow, BoxError>;
}

/// Consumer that discards everything
#[derive(Debug, Default)]
pub struct DiscardOutput;

#[async_trait]
impl OutputConsumer for DiscardOutput {
    async fn consume(
        &mut self,
        stdout: &mut (dyn AsyncBufRead + Unpin + Send),
    ) -> Result<ConsumeFlow, BoxError> {
        tokio::io::copy_buf(stdout, &mut tokio::io::sink()).await?;
        Ok(ConsumeFlow::Drained)
    }
}

/// Consumer that buffers stdout into a string (lossy UTF-8)
#[derive(Debug, Default)]
pub struct CollectOutput {
    pub stdout: String,
}

#[async_trait]
impl OutputConsumer for CollectOutput {
    async fn consume(
        &mut self,
        stdout: &mut (dyn AsyncBufRead + Unpin + Send),
    ) -> Result<ConsumeFlow, BoxError> {
        use tokio::io::AsyncReadExt;

        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await?;
        self.stdout = String::from_utf8_lossy(&buf).into_owned();
        Ok(ConsumeFlow::Drained)
    }
}
