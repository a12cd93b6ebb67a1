//! Handles for waiting on the results of tasks submitted to a [`ThreadPool`].
//!
//! [`ThreadPool`]: crate::thread_pool::ThreadPool

use sluice_common::{Error, Result};

use crate::oneshot::OneshotReceiver;

/// A handle for waiting on the result of a pool task.
///
/// ## Lifecycle
///
/// 1. **Created**: when a task is spawned, a `JoinHandle` is returned
/// 2. **Pending**: the task is queued or running
/// 3. **Ready**: the task has completed (or was aborted) and [`join()`](Self::join)
///    no longer blocks
/// 4. **Consumed**: the result has been retrieved via `join()`
pub struct JoinHandle<R>(OneshotReceiver<R>);

impl<R> JoinHandle<R> {
    pub(crate) fn new(rx: OneshotReceiver<R>) -> JoinHandle<R> {
        JoinHandle(rx)
    }

    /// Waits for the task to complete and returns its result.
    ///
    /// Fails with `TaskAborted` if the task panicked or was dropped before it could
    /// produce a result.
    pub fn join(self) -> Result<R> {
        self.0.recv().ok_or_else(Error::task_aborted)
    }

    /// Waits for all handles and collects their results in the order of the handles.
    ///
    /// Every handle is waited on, even after a failure; the first failure is returned.
    pub fn join_all(handles: impl IntoIterator<Item = JoinHandle<R>>) -> Result<Vec<R>> {
        let results: Vec<Result<R>> = handles.into_iter().map(|h| h.join()).collect();
        results.into_iter().collect()
    }
}
