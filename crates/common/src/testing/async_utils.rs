//! Bounded waits for async tests
//!
//! Chat tests observe background tasks (live pumps, session tasks) through
//! channels and counters. These helpers turn "wait until" into a failure
//! instead of a hung test.

use std::future::Future;
use std::time::Duration;

/// Re-evaluate an async condition every 10ms until it holds, failing the
/// test once `$timeout` has passed.
///
/// `$fut` is re-built on every iteration, so it may borrow fresh state:
///
/// ```ignore
/// assert_eventually_async!(Duration::from_secs(2), async {
///     hub.subscriber_count(&conversation) > 0
/// });
/// ```
#[macro_export]
macro_rules! assert_eventually_async {
    ($timeout:expr, $fut:expr) => {{
        let limit = $timeout;
        let settled = tokio::time::timeout(limit, async {
            while !$fut.await {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await;

        assert!(settled.is_ok(), "Condition did not hold within {:?}", limit);
    }};
}

/// Run `fut` for at most `duration`.
///
/// # Errors
/// Returns `Elapsed` when the future did not finish in time.
pub async fn timeout_ok<F, T>(duration: Duration, fut: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await
}
