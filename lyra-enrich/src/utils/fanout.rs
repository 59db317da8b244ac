//! Bounded-concurrency, best-effort fan-out
//!
//! Used for cleanup work whose failures must never replace the primary outcome:
//! each action's error is logged and counted, and the whole batch is abandoned
//! once `deadline` elapses.

use futures::stream::{self, StreamExt};
use lyra_common::Result;
use std::future::Future;
use std::time::Duration;

/// Outcome summary of a best-effort batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub succeeded: usize,
    pub failed: usize,
    /// True when the deadline elapsed before every action finished
    pub timed_out: bool,
}

/// Run `action` over `items` with at most `concurrency` in flight
pub async fn run_bounded<I, F, Fut>(
    label: &str,
    items: I,
    concurrency: usize,
    deadline: Duration,
    action: F,
) -> FanoutReport
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut report = FanoutReport::default();

    let work = async {
        let mut results = stream::iter(items)
            .map(action)
            .buffer_unordered(concurrency.max(1));

        while let Some(result) = results.next().await {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(batch = label, error = %e, "Best-effort action failed");
                }
            }
        }
    };

    if tokio::time::timeout(deadline, work).await.is_err() {
        report.timed_out = true;
        tracing::warn!(
            batch = label,
            deadline_ms = deadline.as_millis() as u64,
            "Best-effort batch abandoned at deadline"
        );
    }

    report
}
