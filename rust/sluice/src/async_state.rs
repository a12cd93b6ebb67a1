//! State shared between an asynchronous map source and its worker tasks.
//!
//! All fields live behind one mutex and are paired with one condition variable.
//! Worker tasks publish their results through [`AsyncShared::complete`]; the consumer
//! waits on the condition variable for results, failures, or drain.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use sluice_common::{Error, Result};

pub(crate) struct AsyncState<T> {
    /// Completed results in arrival order. `None` marks an element that the map
    /// function dropped.
    pub queue: VecDeque<Option<T>>,
    /// Tasks dispatched but not yet completed.
    pub in_flight: usize,
    /// Set once the inner source returned end-of-stream.
    pub upstream_exhausted: bool,
    /// First failure reported by any task.
    pub failure: Option<Error>,
    /// Map function slots not held by a running task.
    pub free_slots: Vec<usize>,
}

pub(crate) struct AsyncShared<T> {
    state: Mutex<AsyncState<T>>,
    changed: Condvar,
}

impl<T> AsyncShared<T> {
    pub fn new(num_slots: usize) -> Self {
        AsyncShared {
            state: Mutex::new(AsyncState {
                queue: VecDeque::with_capacity(num_slots),
                in_flight: 0,
                upstream_exhausted: false,
                failure: None,
                // Reversed so that slots are handed out starting from 0.
                free_slots: (0..num_slots).rev().collect(),
            }),
            changed: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, AsyncState<T>> {
        self.state.lock().unwrap()
    }

    /// Publishes the outcome of a task that ran on map function slot `slot`.
    ///
    /// The result (or failure), the released slot and the in-flight decrement become
    /// visible to the consumer atomically.
    pub fn complete(&self, slot: usize, result: Result<Option<T>>) {
        let mut state = self.lock();
        match result {
            Ok(example) => state.queue.push_back(example),
            Err(e) => {
                if state.failure.is_none() {
                    log::warn!("map function failed on slot {slot}: {e}");
                    state.failure = Some(e);
                } else {
                    log::debug!("discarding map function failure on slot {slot}: {e}");
                }
            }
        }
        state.free_slots.push(slot);
        state.in_flight -= 1;
        drop(state);
        self.changed.notify_all();
    }

    /// Blocks until the queue has a result, a failure was captured, or nothing is in
    /// flight anymore.
    pub fn wait_for_output(&self) -> MutexGuard<'_, AsyncState<T>> {
        let state = self.lock();
        self.changed
            .wait_while(state, |s| {
                s.queue.is_empty() && s.failure.is_none() && s.in_flight > 0
            })
            .unwrap()
    }

    /// Blocks until every in-flight task has completed.
    ///
    /// Returns the captured failure instead if there is one, without waiting for the
    /// remaining tasks.
    pub fn wait_until_done(&self) -> Result<MutexGuard<'_, AsyncState<T>>> {
        let state = self.lock();
        let state = self
            .changed
            .wait_while(state, |s| s.in_flight > 0 && s.failure.is_none())
            .unwrap();
        match &state.failure {
            Some(e) => Err(e.clone()),
            None => Ok(state),
        }
    }

    /// Waits for every in-flight task, failed or not, then clears the queue, the
    /// captured failure and the upstream-exhausted flag.
    pub fn quiesce(&self) -> MutexGuard<'_, AsyncState<T>> {
        let state = self.lock();
        let mut state = self
            .changed
            .wait_while(state, |s| s.in_flight > 0)
            .unwrap();
        state.queue.clear();
        state.failure = None;
        state.upstream_exhausted = false;
        state
    }
}
