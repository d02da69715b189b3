//! Priority race over concurrent searches / 按优先级竞速
//!
//! All tasks start at once. Completed results are inspected in submission
//! order, stopping at the first task that is still running, so a lower
//! priority result never commits while a higher priority one is pending.

use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::task::{AbortHandle, JoinHandle};

use crate::error::{Result, SearchError};

fn abort_all(handles: &[AbortHandle]) {
    for handle in handles {
        handle.abort();
    }
}

/// Return the first result accepted by `accept`, in priority order
///
/// Priority is the position in `tasks` (lower wins). Once a result commits,
/// the remaining tasks are aborted without waiting for them. A task error is
/// returned only when inspection reaches that task. When nothing is
/// accepted, the last evaluated result is returned.
pub async fn quick_exit<T, F>(accept: F, tasks: Vec<BoxFuture<'static, Result<T>>>) -> Result<T>
where
    T: Send + 'static,
    F: Fn(&T) -> bool,
{
    if tasks.is_empty() {
        return Err(SearchError::validation("nothing to race"));
    }

    let total = tasks.len();
    let mut abort_handles: Vec<AbortHandle> = Vec::with_capacity(total);
    let mut pending: FuturesUnordered<JoinHandle<(usize, Result<T>)>> = FuturesUnordered::new();

    for (priority, task) in tasks.into_iter().enumerate() {
        let handle = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(SearchError::backend("search task panicked")));
            (priority, outcome)
        });
        abort_handles.push(handle.abort_handle());
        pending.push(handle);
    }

    let mut finished: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();
    let mut next = 0;
    let mut last = None;

    while let Some(joined) = pending.next().await {
        let (priority, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!("Search task did not complete: {}", e);
                continue;
            }
        };
        finished[priority] = Some(outcome);

        while next < total {
            match finished[next].take() {
                None => break,
                Some(Err(e)) => {
                    tracing::debug!("Race stopped on error from task {}: {}", next, e);
                    abort_all(&abort_handles);
                    return Err(e);
                }
                Some(Ok(value)) => {
                    next += 1;
                    if accept(&value) {
                        tracing::debug!("Race committed task {} of {}", next - 1, total);
                        abort_all(&abort_handles);
                        return Ok(value);
                    }
                    last = Some(value);
                }
            }
        }
    }

    if next < total {
        return Err(SearchError::backend("search task was cancelled before completing"));
    }
    last.ok_or_else(|| SearchError::backend("race finished without a result"))
}
