//! Bounded joins for background tasks

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{CommonError, CommonResult};

/// Await `handle` for at most `timeout`.
///
/// A task that outlives the timeout is aborted so it cannot act after its
/// owner considers it stopped.
///
/// # Errors
/// - `CommonError::AsyncTimeout` when the task did not finish in time
/// - `CommonError::TaskCancelled` when the task was aborted elsewhere
/// - `CommonError::Internal` when the task panicked
pub async fn join_with_timeout<T>(
    name: &str,
    handle: JoinHandle<T>,
    timeout: Duration,
) -> CommonResult<T> {
    let abort = handle.abort_handle();
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.is_cancelled() => Err(CommonError::task_cancelled(name)),
        Ok(Err(e)) => {
            warn!(task = name, error = %e, "Task panicked");
            Err(CommonError::internal_with_context(e.to_string(), name))
        }
        Err(_) => {
            warn!(task = name, ?timeout, "Task did not complete within timeout, aborting");
            abort.abort();
            Err(CommonError::async_timeout(name, timeout))
        }
    }
}
