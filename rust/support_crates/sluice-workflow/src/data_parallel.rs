//! Order-preserving parallel processing of owned batches.
//!
//! [`map`] applies a function to every item of a batch, either on the caller's thread
//! or on the workers of a [`ThreadPool`], and returns the results in the order of the
//! input items. Single-item batches and pools without workers always run
//! sequentially, avoiding the dispatch overhead where no parallelism is available.

use sluice_common::Result;

use crate::{join_handle::JoinHandle, thread_pool::ThreadPool};

/// Maps `f` over `items`, returning the results in input order.
///
/// # Behavior
///
/// - If there is at most one item, or `pool` has no workers, runs sequentially on the
///   caller's thread
/// - Otherwise submits one task per item to `pool` and waits for all of them before
///   returning, so no task is still running once this function returns
///
/// Fails only if the pool rejects work or a task is aborted by a panic; errors produced
/// by `f` itself are part of `R` and are returned as values.
pub fn map<T, R, F>(pool: &ThreadPool, items: Vec<T>, f: F) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Clone + Send + 'static,
{
    if items.len() <= 1 || pool.num_threads() == 0 {
        return Ok(items.into_iter().map(f).collect());
    }

    let mut deferred = Vec::with_capacity(items.len());
    for item in items {
        let f = f.clone();
        match pool.spawn(move || f(item)) {
            Ok(handle) => deferred.push(handle),
            Err(e) => {
                // Wait for the already queued tasks before reporting the failure.
                let _ = JoinHandle::join_all(deferred);
                return Err(e);
            }
        }
    }
    JoinHandle::join_all(deferred)
}
