//! Timeout-as-race combinator.
//!
//! Every timeout in the crate is a race between the primary operation and a
//! timer; whichever side loses must still be cleaned up before the timeout
//! is allowed to surface. [`with_timeout`] encodes that contract: the
//! `on_timeout` future (solver cancel, dig abort, control release) always
//! runs to completion on the timing-out path, and the outcome is an enum
//! rather than an error so callers decide what a timeout means.

use std::future::Future;
use std::time::Duration;

use tokio::time;

/// Outcome of a timed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedResult<T> {
    /// The primary operation finished within the budget.
    Completed(T),
    /// The budget elapsed; cleanup has already run.
    TimedOut,
}

impl<T> TimedResult<T> {
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    pub fn into_completed(self) -> Option<T> {
        match self {
            Self::Completed(v) => Some(v),
            Self::TimedOut => None,
        }
    }
}

/// Race `primary` against `budget`; on timeout, await `on_timeout` before
/// reporting.
pub async fn with_timeout<T, P, C>(budget: Duration, primary: P, on_timeout: C) -> TimedResult<T>
where
    P: Future<Output = T>,
    C: Future<Output = ()>,
{
    match time::timeout(budget, primary).await {
        Ok(value) => TimedResult::Completed(value),
        Err(_) => {
            on_timeout.await;
            TimedResult::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_completion_within_budget() {
        let result = with_timeout(
            Duration::from_secs(5),
            async { 42 },
            async { panic!("cleanup must not run on success") },
        )
        .await;
        assert_eq!(result, TimedResult::Completed(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_runs_cleanup_first() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = cleaned.clone();

        let result: TimedResult<()> = with_timeout(
            Duration::from_millis(100),
            time::sleep(Duration::from_secs(60)),
            async move {
                flag.store(true, Ordering::SeqCst);
            },
        )
        .await;

        assert!(result.timed_out());
        assert!(cleaned.load(Ordering::SeqCst), "cleanup skipped on timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_into_completed() {
        let ok = with_timeout(Duration::from_secs(1), async { "done" }, async {}).await;
        assert_eq!(ok.into_completed(), Some("done"));

        let timed: TimedResult<&str> = with_timeout(
            Duration::from_millis(1),
            std::future::pending(),
            async {},
        )
        .await;
        assert_eq!(timed.into_completed(), None);
    }
}
