//! Execution context handed to every pool task
//!
//! Cancellation is cooperative: the pool cancels the shared token on `close`,
//! and tasks are expected to observe it (directly or through `run`). A task
//! that ignores it keeps its worker busy until it finishes on its own.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Why a guarded future did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The pool is shutting down
    Cancelled,
    /// The task's own deadline elapsed
    TimedOut(Duration),
}

/// Per-task context: the slot the task runs on and the pool's shutdown token.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    slot: usize,
    cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(slot: usize, cancel: CancellationToken) -> Self {
        Self { slot, cancel }
    }

    /// Index of the resource running this task.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the pool starts shutting down.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Drive `fut` until it completes, the deadline passes, or the pool shuts down.
    pub async fn run<F: Future>(
        &self,
        timeout: Duration,
        fut: F,
    ) -> std::result::Result<F::Output, Interrupted> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            res = tokio::time::timeout(timeout, fut) => {
                res.map_err(|_| Interrupted::TimedOut(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_output_when_fast() {
        let ctx = ExecutionContext::new(0, CancellationToken::new());
        let out = ctx.run(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn run_times_out() {
        let ctx = ExecutionContext::new(1, CancellationToken::new());
        let out = ctx
            .run(
                Duration::from_millis(50),
                tokio::time::sleep(Duration::from_secs(10)),
            )
            .await;
        assert_eq!(out, Err(Interrupted::TimedOut(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn run_observes_cancellation() {
        let token = CancellationToken::new();
        let ctx = ExecutionContext::new(0, token.clone());
        token.cancel();
        let out = ctx
            .run(Duration::from_secs(60), std::future::pending::<()>())
            .await;
        assert_eq!(out, Err(Interrupted::Cancelled));
        assert!(ctx.is_cancelled());
    }
}
