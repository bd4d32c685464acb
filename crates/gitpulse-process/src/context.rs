use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::KillReason;

/// Cancellation and deadline carried into every process run
#[derive(Debug, Clone)]
pub struct ExecContext {
    cancelled: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Cancels the [`ExecContext`] it was created with (and all its clones)
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl ExecContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        // Dropping the sender leaves the flag false forever
        let (_, cancelled) = watch::channel(false);
        Self {
            cancelled,
            deadline: None,
        }
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let (sender, cancelled) = watch::channel(false);
        let ctx = Self {
            cancelled,
            deadline: None,
        };
        let handle = CancelHandle {
            sender: Arc::new(sender),
        };
        (ctx, handle)
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Narrows the deadline; an earlier existing deadline is kept
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check
    pub fn is_done(&self) -> Option<KillReason> {
        if *self.cancelled.borrow() {
            return Some(KillReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(KillReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> KillReason {
        let mut cancelled = self.cancelled.clone();
        let wait_cancel = async move {
            loop {
                if *cancelled.borrow_and_update() {
                    return;
                }
                if cancelled.changed().await.is_err() {
                    // Sender gone without cancelling
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = wait_cancel => KillReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => KillReason::DeadlineExceeded,
            },
            None => {
                wait_cancel.await;
                KillReason::Cancelled
            }
        }
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_never_done() {
        let ctx = ExecContext::background();
        assert_eq!(ctx.is_done(), None);
        let waited = tokio::time::timeout(Duration::from_millis(20), ctx.done()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_cancel_wakes_all_clones() {
        let (ctx, handle) = ExecContext::with_cancel();
        let clone = ctx.clone();
        let waiter = tokio::spawn(async move { clone.done().await });

        handle.cancel();

        assert_eq!(waiter.await.unwrap(), KillReason::Cancelled);
        assert_eq!(ctx.is_done(), Some(KillReason::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_survives_dropped_handle() {
        let (ctx, handle) = ExecContext::with_cancel();
        handle.cancel();
        drop(handle);
        assert_eq!(ctx.done().await, KillReason::Cancelled);
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let ctx = ExecContext::background().with_timeout(Duration::from_millis(10));
        assert_eq!(ctx.done().await, KillReason::DeadlineExceeded);
        assert_eq!(ctx.is_done(), Some(KillReason::DeadlineExceeded));
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = ExecContext::background()
            .with_deadline(now + Duration::from_secs(5))
            .with_deadline(now + Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(5)));
    }
}
