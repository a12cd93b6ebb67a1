//! Fixed-size thread pool for concurrent task execution.
//!
//! Work items are boxed closures placed on a shared FIFO [`TaskQueue`]; every worker
//! thread takes the oldest queued item as soon as it becomes free. Items can either be
//! waited on (using [`JoinHandle`]) or executed in a fire-and-forget manner.
//!
//! Shutting the pool down (explicitly or by dropping it) closes the queue, lets the
//! workers drain the work that is already queued, and joins every worker thread.

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    thread,
};

use sluice_common::{Error, Result};

use crate::{join_handle::JoinHandle, oneshot, task_queue::TaskQueue};

/// A fixed-size pool of worker threads.
///
/// The pool is owned by a single component; `submit` and `spawn` take `&self` and may
/// be called from any thread, including from within a running task.
pub struct ThreadPool {
    queue: TaskQueue<TaskFn>,
    workers: Vec<thread::JoinHandle<()>>,
    num_threads: usize,
}

/// A boxed unit of work executed by a worker thread.
type TaskFn = Box<dyn FnOnce() + Send + 'static>;

impl ThreadPool {
    /// Creates a new `ThreadPool` with `num_threads` worker threads.
    ///
    /// A pool with zero threads is valid: it owns no threads and rejects all work
    /// with an `InvalidOperation` error. Owners use such a pool when they execute
    /// everything inline.
    pub fn new(num_threads: usize) -> Result<Self> {
        Self::with_thread_name(num_threads, |_| String::new())
    }

    /// Creates a new `ThreadPool` whose worker threads are named by `thread_name`.
    ///
    /// `thread_name` is called with the 0-based index of each worker. If it returns an
    /// empty string, that worker keeps the default (unnamed) thread name.
    pub fn with_thread_name(
        num_threads: usize,
        thread_name: impl Fn(usize) -> String,
    ) -> Result<Self> {
        let queue = TaskQueue::<TaskFn>::new();
        let mut pool = ThreadPool {
            queue,
            workers: Vec::with_capacity(num_threads),
            num_threads,
        };
        for i in 0..num_threads {
            let queue = pool.queue.clone();
            let mut builder = thread::Builder::new();
            let name = thread_name(i);
            if !name.is_empty() {
                builder = builder.name(name);
            }
            // On failure `pool` is dropped, which shuts down the already spawned workers.
            let worker = builder
                .spawn(move || Self::thread_fn(queue))
                .map_err(|e| Error::io("spawn worker thread", e))?;
            pool.workers.push(worker);
        }

        log::debug!("thread pool started with {num_threads} workers");
        Ok(pool)
    }

    /// Returns the number of worker threads the pool was created with.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Returns `true` once [`shutdown()`](Self::shutdown) has begun.
    pub fn is_stopped(&self) -> bool {
        self.queue.is_closed()
    }

    /// Queues `f` for execution by the next free worker, without a way to wait for it.
    ///
    /// Fails with `PoolStopped` after shutdown, and with `InvalidOperation` if the pool
    /// has no workers.
    pub fn submit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.num_threads == 0 && !self.is_stopped() {
            return Err(Error::invalid_operation("submit to a thread pool without workers"));
        }
        self.queue
            .push(Box::new(f))
            .map_err(|_| Error::pool_stopped())
    }

    /// Queues `f` for execution and returns a handle to wait for its result.
    ///
    /// If `f` panics, the panic is contained in the worker and the handle reports
    /// `TaskAborted`.
    pub fn spawn<F, R>(&self, f: F) -> Result<JoinHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx_result, rx_result) = oneshot::channel::<R>();
        self.submit(move || {
            let result = f();
            // The receiver may have been dropped; nobody is waiting then.
            let _ = tx_result.send(result);
        })?;
        Ok(JoinHandle::new(rx_result))
    }

    /// Stops accepting new work, waits for queued work to drain and joins every
    /// worker thread. Calling it more than once is a no-op.
    pub fn shutdown(&mut self) {
        if self.is_stopped() && self.workers.is_empty() {
            return;
        }
        self.queue.close();
        let num_workers = self.workers.len();
        for worker in self.workers.drain(..) {
            // Task panics are caught in `thread_fn`, so a worker can only fail to join
            // if the runtime itself aborted it.
            if worker.join().is_err() {
                log::error!("thread pool worker terminated abnormally");
            }
        }
        log::debug!("thread pool with {num_workers} workers shut down");
    }

    fn thread_fn(queue: TaskQueue<TaskFn>) {
        while let Some(task) = queue.pop() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                log::error!("thread pool task panicked: {}", panic_message(&*payload));
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_common::ErrorKind;
    use std::{
        sync::{
            Arc, Barrier, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::{Duration, Instant},
    };

    #[test]
    fn test_new_thread_pool() {
        let pool = ThreadPool::new(2).unwrap();
        assert_eq!(pool.num_threads(), 2);
        drop(pool);
    }

    #[test]
    fn test_zero_threads_pool() {
        let pool = ThreadPool::new(0).unwrap();
        assert_eq!(pool.num_threads(), 0);
        let err = pool.submit(|| {}).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
        assert!(pool.spawn(|| 1).is_err());
    }

    #[test]
    fn test_spawn_simple_task() {
        let pool = ThreadPool::new(2).unwrap();
        let handle = pool.spawn(|| 42).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn test_spawn_multiple_tasks() {
        let pool = ThreadPool::new(2).unwrap();
        let handles: Vec<_> = (0..10)
            .map(|i| pool.spawn(move || i * 2).unwrap())
            .collect();

        let results = JoinHandle::join_all(handles).unwrap();
        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result, i * 2);
        }
    }

    #[test]
    fn test_fifo_start_order_single_worker() {
        let pool = ThreadPool::new(1).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..20 {
            let order = order.clone();
            pool.submit(move || order.lock().unwrap().push(i)).unwrap();
        }
        let mut pool = pool;
        pool.shutdown();
        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_shutdown_drains_queued_work() {
        let mut pool = ThreadPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = counter.clone();
            pool.submit(move || {
                std::thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert!(pool.is_stopped());
        assert_eq!(pool.num_threads(), 2);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let mut pool = ThreadPool::new(2).unwrap();
        pool.shutdown();
        let err = pool.submit(|| {}).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::PoolStopped));
        // Second shutdown is a no-op.
        pool.shutdown();
    }

    #[test]
    fn test_concurrent_task_execution() {
        let pool = ThreadPool::new(4).unwrap();
        let barrier = Arc::new(Barrier::new(4));
        let start_time = Instant::now();

        // All four tasks must be running at once for the barrier to release.
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = barrier.clone();
                pool.spawn(move || {
                    barrier.wait();
                    42
                })
                .unwrap()
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert!(start_time.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let pool = ThreadPool::new(1).unwrap();
        let handle = pool.spawn(|| -> u32 { panic!("task failure") }).unwrap();
        assert!(matches!(
            handle.join().unwrap_err().kind(),
            ErrorKind::TaskAborted
        ));
        let handle = pool.spawn(|| 7).unwrap();
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn test_named_threads() {
        let pool = ThreadPool::with_thread_name(2, |i| format!("worker-{i}")).unwrap();
        let name = pool
            .spawn(|| std::thread::current().name().map(str::to_string))
            .unwrap()
            .join()
            .unwrap();
        assert!(name.unwrap().starts_with("worker-"));
    }

    #[test]
    fn test_recursive_task_spawning() {
        let pool = Arc::new(ThreadPool::new(2).unwrap());
        let inner_pool = pool.clone();

        let handle = pool
            .spawn(move || {
                let inner_handle = inner_pool.spawn(|| 100).unwrap();
                inner_handle.join().unwrap() + 50
            })
            .unwrap();

        assert_eq!(handle.join().unwrap(), 150);
    }

    #[test]
    fn test_many_small_tasks() {
        let pool = ThreadPool::new(4).unwrap();
        let num_tasks = 1000;

        let handles: Vec<_> = (0..num_tasks)
            .map(|i| pool.spawn(move || i).unwrap())
            .collect();

        for (expected, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(&*payload), "static message");
        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 5)).unwrap_err();
        assert_eq!(panic_message(&*payload), "formatted 5");
    }
}
