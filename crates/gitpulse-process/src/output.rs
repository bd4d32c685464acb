use serde::{Deserialize, Serialize};

/// Why a process was forcefully terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillReason {
    /// The caller cancelled the execution context
    Cancelled,
    /// The execution context's deadline passed
    DeadlineExceeded,
    /// Something outside the runner sent the kill signal (OOM killer, operator)
    Signal,
}

impl std::fmt::Display for KillReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KillReason::Cancelled => write!(f, "cancelled"),
            KillReason::DeadlineExceeded => write!(f, "deadline exceeded"),
            KillReason::Signal => write!(f, "killed by signal"),
        }
    }
}

/// Classified result of one process run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Success,
    Failed {
        /// None when the process ended by a signal other than kill
        exit_code: Option<i32>,
        stderr: String,
    },
    Killed(KillReason),
}
