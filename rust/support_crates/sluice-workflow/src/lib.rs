//! Thread-based execution utilities for pipeline stages.
//!
//! # Key Components
//!
//! - [`thread_pool::ThreadPool`] - A fixed-size pool of worker threads draining a FIFO
//!   task queue, with graceful (draining) shutdown
//! - [`task_queue`] - The blocking FIFO queue the pool workers consume
//! - [`oneshot`] - Single-value communication between threads
//! - [`join_handle`] - Handles for waiting on the results of pool tasks
//! - [`data_parallel`] - Order-preserving parallel `map` over a batch of owned items,
//!   with sequential fallback for single-item batches

pub mod data_parallel;
pub mod join_handle;
pub mod oneshot;
pub mod task_queue;
pub mod thread_pool;
