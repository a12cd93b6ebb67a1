//! A blocking, closable FIFO queue shared by one or more producers and consumers.
//!
//! The queue is unbounded. Consumers block in [`TaskQueue::pop`] while the queue is
//! empty and open. Closing the queue rejects further pushes but lets consumers drain
//! the items that are already queued; once the queue is closed and empty, `pop`
//! returns `None`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

/// A handle to a shared FIFO queue. Clones refer to the same queue.
pub struct TaskQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        TaskQueue {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        TaskQueue {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    closed: false,
                }),
                not_empty: Condvar::new(),
            }),
        }
    }

    /// Appends an item to the back of the queue.
    ///
    /// Returns `Err(item)`, giving the item back, if the queue has been closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            return Err(item);
        }
        state.queue.push_back(item);

        // Drop the lock before notifying to reduce contention.
        drop(state);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Removes the item at the front of the queue, blocking while the queue is empty
    /// and still open.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub fn pop(&self) -> Option<T> {
        let state = self.inner.state.lock().unwrap();
        let mut state = self
            .inner
            .not_empty
            .wait_while(state, |s| s.queue.is_empty() && !s.closed)
            .unwrap();
        state.queue.pop_front()
    }

    /// Closes the queue and wakes all blocked consumers.
    ///
    /// Already queued items stay available to `pop`.
    pub fn close(&self) {
        self.inner.state.lock().unwrap().closed = true;
        self.inner.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().unwrap().closed
    }
}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar, // Signals consumers that an item was added or the queue closed.
}
