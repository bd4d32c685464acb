//! # gitpulse-process
//!
//! Subprocess plumbing for gitpulse.
//!
//! A [`ProcessRunner`] starts one process per call, hands its stdout to an
//! [`OutputConsumer`] while the process is still writing, and reports a
//! [`ProcessOutcome`]: success, failure with captured stderr, or killed.
//!
//! Cancellation comes from an [`ExecContext`]. When it fires the runner closes
//! the pipe, waits a grace period, then kills the child. Kills the runner did
//! not cause are recognised through [`was_killed`].

mod context;
mod output;
mod spawner;
mod termination;
mod traits;

pub use context::{CancelHandle, ExecContext};
pub use output::{KillReason, ProcessOutcome};
pub use spawner::ProcessRunner;
pub use termination::{is_killed_text, was_killed, KILLED_STATUS_TEXT};
pub use traits::{
    BoxError, CollectOutput, CommandSpec, ConsumeFlow, DiscardOutput, OutputConsumer,
    ProcessError,
};
