use gitpulse_process::{KillReason, ProcessError};
use thiserror::Error;

/// Errors returned by the statistics operations
#[derive(Error, Debug)]
pub enum StatsError {
    /// Missing executable or invalid repository; retrying will not help
    #[error("Configuration error: {0}")]
    Config(String),

    /// git failed or printed something unparseable
    #[error("Query failed: {0}")]
    Query(String),

    /// git was killed before the query finished
    #[error("Query cancelled: {0}")]
    Cancelled(KillReason),
}

impl StatsError {
    /// Only cancellations are worth retrying (e.g. with a longer deadline)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl From<ProcessError> for StatsError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::NotFound(program) => {
                StatsError::Config(format!("git executable not found: {}", program))
            }
            ProcessError::SpawnFailed(e) => {
                StatsError::Config(format!("failed to start git: {}", e))
            }
            ProcessError::Io(e) => StatsError::Query(format!("failed to read git output: {}", e)),
            ProcessError::Consumer(e) => StatsError::Query(e.to_string()),
        }
    }
}

impl From<ParseError> for StatsError {
    fn from(err: ParseError) -> Self {
        StatsError::Query(err.to_string())
    }
}

/// A commit stream that cannot be interpreted
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to read log output: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: malformed commit header {header:?}")]
    MalformedHeader { line: usize, header: String },

    #[error("line {line}: invalid commit timestamp {value:?}")]
    InvalidTimestamp { line: usize, value: String },

    #[error("line {line}: output before the first commit header: {content:?}")]
    UnexpectedLine { line: usize, content: String },
}
