//! A pipeline stage that applies map functions to the elements of an inner source.
//!
//! [`MapSource`] runs in one of three modes, selected by its [`MapOptions`]:
//!
//! - **Sequential**: each element is mapped on the caller's thread as it is pulled.
//! - **Deterministic-parallel**: up to `num_parallel_calls` elements are pulled into a
//!   buffer and mapped concurrently on the worker pool; results are returned in input
//!   order before the next batch is pulled.
//! - **Asynchronous**: up to `num_parallel_calls` elements are in flight on the worker
//!   pool at any time; results are returned in the order they complete.
//!
//! Map functions are owned per slot. Slot `i` of a deterministic batch is always
//! mapped by function `i`, and an asynchronous task holds a slot exclusively until it
//! completes, so a stateful map function is never called from two threads at once.
//!
//! # Checkpoints
//!
//! A strict checkpoint captures the buffered or queued results verbatim, followed by
//! the position of the inner source:
//!
//! ```text
//! sequential / deterministic:  [buffer: Vec<Option<T>>] [cursor: u64] [inner...]
//! asynchronous:                [len: u64] [Option<T>] x len           [inner...]
//! non-strict:                                                          [inner...]
//! ```
//!
//! Recording an asynchronous checkpoint first waits for every in-flight task, so no
//! result can be produced after the checkpoint was taken.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use sluice_common::{Error, Result, verify_arg};
use sluice_tape::Tape;
use sluice_workflow::{
    data_parallel,
    thread_pool::{ThreadPool, panic_message},
};

use crate::{
    async_state::AsyncShared,
    data_source::{DataSource, Element, Finitude},
    map_options::{MapMode, MapOptions},
};

/// A map function: takes an element by value and returns the mapped element, or `None`
/// to drop it.
pub type MapFn<T> = Box<dyn FnMut(T) -> Result<Option<T>> + Send + 'static>;

/// A map function bound to a slot. The mutex is never contended: a slot is used by at
/// most one task at a time.
type SlotFn<T> = Arc<Mutex<MapFn<T>>>;

/// Progress of an asynchronous map source.
///
/// Sequential and deterministic map sources always report [`MapPhase::Idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapPhase {
    /// Nothing is in flight or queued.
    Idle,
    /// Elements are being pulled and mapped.
    Admitting,
    /// The inner source is exhausted; remaining tasks are completing.
    Draining,
    /// The inner source is exhausted and every result has been returned.
    Exhausted,
    /// A map function failed. Every `next` returns the failure until the source is
    /// reset or reloaded.
    Failed,
}

/// Applies map functions to the elements of an inner source, optionally in parallel.
pub struct MapSource<S>
where
    S: DataSource,
{
    pool: ThreadPool,
    inner: S,
    fns: Vec<SlotFn<S::Item>>,
    num_parallel_calls: usize,
    mode: MapMode,
    buffer: Vec<Option<S::Item>>,
    buffer_pos: usize,
    /// Failures of the current batch, by buffer index in ascending order. A failure
    /// at `buffer.len()` is an inner source error raised after the batch was pulled.
    buffer_failures: VecDeque<(usize, Error)>,
    async_state: Arc<AsyncShared<S::Item>>,
}

impl<S> MapSource<S>
where
    S: DataSource,
    S::Item: Element,
{
    /// Creates a map source over `inner`.
    ///
    /// `fns` holds one map function per slot and must contain at least
    /// `max(1, options.num_parallel_calls)` functions; any extra functions are dropped.
    pub fn new(inner: S, fns: Vec<MapFn<S::Item>>, options: MapOptions) -> Result<Self> {
        options
            .validate()
            .map_err(|message| Error::invalid_arg("options", message))?;
        let num_slots = options.num_slots();
        verify_arg!(fns, fns.len() >= num_slots);

        let mode = options.mode();
        let num_threads = match mode {
            MapMode::Sequential => 0,
            MapMode::DeterministicParallel | MapMode::Async => options.num_parallel_calls,
        };
        let pool = ThreadPool::with_thread_name(num_threads, |i| format!("sluice-map-{i}"))?;

        let fns = fns
            .into_iter()
            .take(num_slots)
            .map(|f| Arc::new(Mutex::new(f)))
            .collect();

        log::debug!(
            "map source created: mode={mode:?}, num_parallel_calls={}",
            options.num_parallel_calls
        );

        Ok(MapSource {
            pool,
            inner,
            fns,
            num_parallel_calls: options.num_parallel_calls,
            mode,
            buffer: Vec::with_capacity(num_slots),
            buffer_pos: 0,
            buffer_failures: VecDeque::new(),
            async_state: Arc::new(AsyncShared::new(num_slots)),
        })
    }

    /// Creates a map source whose slots each own a clone of `f`.
    pub fn from_fn<F>(inner: S, f: F, options: MapOptions) -> Result<Self>
    where
        F: FnMut(S::Item) -> Result<Option<S::Item>> + Clone + Send + 'static,
    {
        let fns = (0..options.num_slots())
            .map(|_| Box::new(f.clone()) as MapFn<S::Item>)
            .collect();
        Self::new(inner, fns, options)
    }

    pub fn mode(&self) -> MapMode {
        self.mode
    }

    pub fn num_parallel_calls(&self) -> usize {
        self.num_parallel_calls
    }

    /// Number of asynchronous tasks dispatched but not yet completed.
    pub fn num_in_flight(&self) -> usize {
        self.async_state.lock().in_flight
    }

    pub fn phase(&self) -> MapPhase {
        let state = self.async_state.lock();
        if state.failure.is_some() {
            MapPhase::Failed
        } else if state.upstream_exhausted {
            if state.in_flight == 0 && state.queue.is_empty() {
                MapPhase::Exhausted
            } else {
                MapPhase::Draining
            }
        } else if state.in_flight > 0 || !state.queue.is_empty() {
            MapPhase::Admitting
        } else {
            MapPhase::Idle
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn next_sequential(&mut self) -> Result<Option<S::Item>> {
        while let Some(example) = self.inner.next()? {
            if let Some(example) = invoke_slot(&self.fns[0], example)? {
                return Ok(Some(example));
            }
        }
        Ok(None)
    }

    fn next_deterministic(&mut self) -> Result<Option<S::Item>> {
        loop {
            loop {
                if let Some(e) = self.take_buffer_failure() {
                    return Err(e);
                }
                if self.buffer_pos >= self.buffer.len() {
                    break;
                }
                let example = self.buffer[self.buffer_pos].take();
                self.buffer_pos += 1;
                if example.is_some() {
                    return Ok(example);
                }
            }

            // All buffered examples are consumed; refill.
            if !self.fill_buffer()? {
                return Ok(None);
            }
        }
    }

    /// Returns the failure recorded for the element at the cursor, stepping over
    /// its empty buffer slot.
    fn take_buffer_failure(&mut self) -> Option<Error> {
        let (index, _) = self.buffer_failures.front()?;
        if *index != self.buffer_pos {
            return None;
        }
        let (_, e) = self.buffer_failures.pop_front()?;
        if self.buffer_pos < self.buffer.len() {
            self.buffer_pos += 1;
        }
        Some(e)
    }

    /// Pulls the next batch and maps it, slot `i` with map function `i`.
    ///
    /// Returns `false` if the inner source had no more elements. A failing element
    /// leaves an empty slot and a failure at its index, so the other elements of the
    /// batch are still returned in order. An inner source error ends the batch early
    /// and is reported after the elements pulled before it.
    fn fill_buffer(&mut self) -> Result<bool> {
        self.buffer.clear();
        self.buffer_pos = 0;
        self.buffer_failures.clear();

        let mut batch = Vec::with_capacity(self.fns.len());
        let mut upstream_error = None;
        while batch.len() < self.fns.len() {
            match self.inner.next() {
                Ok(Some(example)) => batch.push(example),
                Ok(None) => break,
                Err(e) if batch.is_empty() => return Err(e),
                Err(e) => {
                    upstream_error = Some(e);
                    break;
                }
            }
        }
        if batch.is_empty() {
            return Ok(false);
        }

        let work: Vec<(S::Item, SlotFn<S::Item>)> =
            batch.into_iter().zip(self.fns.iter().cloned()).collect();
        let results = data_parallel::map(&self.pool, work, |(example, slot)| {
            invoke_slot(&slot, example)
        })?;

        let mut buffer = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(example) => buffer.push(example),
                Err(e) => {
                    self.buffer_failures.push_back((index, e));
                    buffer.push(None);
                }
            }
        }
        if let Some(e) = upstream_error {
            self.buffer_failures.push_back((buffer.len(), e));
        }
        self.buffer = buffer;
        Ok(true)
    }

    fn next_async(&mut self) -> Result<Option<S::Item>> {
        loop {
            self.admit_async()?;

            let mut state = self.async_state.wait_for_output();
            if let Some(e) = &state.failure {
                return Err(e.clone());
            }
            match state.queue.pop_front() {
                Some(Some(example)) => return Ok(Some(example)),
                // Dropped by the map function; keep waiting.
                Some(None) => continue,
                None if state.upstream_exhausted => return Ok(None),
                None => continue,
            }
        }
    }

    /// Dispatches new tasks while fewer than `num_parallel_calls` results are in
    /// flight or queued and the inner source has more elements.
    fn admit_async(&mut self) -> Result<()> {
        loop {
            let slot = {
                let mut state = self.async_state.lock();
                if let Some(e) = &state.failure {
                    return Err(e.clone());
                }
                if state.upstream_exhausted
                    || state.in_flight + state.queue.len() >= self.num_parallel_calls
                {
                    return Ok(());
                }
                match state.free_slots.pop() {
                    Some(slot) => slot,
                    None => return Ok(()),
                }
            };

            // The inner source is pulled without holding the lock, so completing tasks
            // are not blocked behind it.
            let example = match self.inner.next() {
                Ok(Some(example)) => example,
                Ok(None) => {
                    let mut state = self.async_state.lock();
                    state.free_slots.push(slot);
                    state.upstream_exhausted = true;
                    return Ok(());
                }
                Err(e) => {
                    self.async_state.lock().free_slots.push(slot);
                    return Err(e);
                }
            };

            self.async_state.lock().in_flight += 1;

            let shared = self.async_state.clone();
            let f = self.fns[slot].clone();
            let submitted = self.pool.submit(move || {
                let result = invoke_slot(&f, example);
                shared.complete(slot, result);
            });
            if let Err(e) = submitted {
                let mut state = self.async_state.lock();
                state.in_flight -= 1;
                state.free_slots.push(slot);
                return Err(e);
            }
        }
    }

    fn clear_transient_state(&mut self) {
        self.buffer.clear();
        self.buffer_pos = 0;
        self.buffer_failures.clear();
        drop(self.async_state.quiesce());
    }
}

impl<S> DataSource for MapSource<S>
where
    S: DataSource,
    S::Item: Element,
{
    type Item = S::Item;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        match self.mode {
            MapMode::Sequential => self.next_sequential(),
            MapMode::DeterministicParallel => self.next_deterministic(),
            MapMode::Async => self.next_async(),
        }
    }

    fn reset(&mut self, reset_rng: bool) -> Result<()> {
        self.clear_transient_state();
        log::debug!("map source reset (reset_rng={reset_rng})");
        self.inner.reset(reset_rng)
    }

    fn record_position(&self, tape: &mut Tape, strict: bool) -> Result<()> {
        if strict {
            match self.mode {
                MapMode::Sequential | MapMode::DeterministicParallel => {
                    // A failure not yet returned by `next` cannot be replayed.
                    if let Some((_, e)) = self.buffer_failures.front() {
                        return Err(e.clone());
                    }
                    tape.record(&self.buffer)?;
                    tape.record(&(self.buffer_pos as u64))?;
                }
                MapMode::Async => {
                    // A checkpoint must never capture a task mid-flight.
                    let state = self.async_state.wait_until_done()?;
                    tape.record(&(state.queue.len() as u64))?;
                    for example in &state.queue {
                        tape.record(example)?;
                    }
                    log::debug!(
                        "recorded {} queued results of async map source",
                        state.queue.len()
                    );
                }
            }
        }
        self.inner.record_position(tape, strict)
    }

    fn reload_position(&mut self, tape: &mut Tape, strict: bool) -> Result<()> {
        self.clear_transient_state();

        if strict {
            match self.mode {
                MapMode::Sequential | MapMode::DeterministicParallel => {
                    let buffer = tape.read::<Vec<Option<S::Item>>>()?;
                    let buffer_pos = usize::try_from(tape.read::<u64>()?)
                        .map_err(|_| Error::corrupt_tape("map buffer offset out of range"))?;
                    if buffer_pos > buffer.len() {
                        return Err(Error::corrupt_tape(format!(
                            "map buffer offset {buffer_pos} exceeds buffer length {}",
                            buffer.len()
                        )));
                    }
                    self.buffer = buffer;
                    self.buffer_pos = buffer_pos;
                }
                MapMode::Async => {
                    let len = tape.read::<u64>()?;
                    let mut queue =
                        VecDeque::with_capacity((len as usize).min(self.num_parallel_calls));
                    for _ in 0..len {
                        queue.push_back(tape.read::<Option<S::Item>>()?);
                    }
                    log::debug!("reloaded {len} queued results of async map source");
                    self.async_state.lock().queue = queue;
                }
            }
        }

        self.inner.reload_position(tape, strict)
    }

    fn finitude(&self) -> Finitude {
        self.inner.finitude()
    }
}

/// Calls the map function of `slot` on `example`, turning a panic into an error.
fn invoke_slot<T>(slot: &SlotFn<T>, example: T) -> Result<Option<T>> {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    let f = &mut **guard;
    match catch_unwind(AssertUnwindSafe(move || f(example))) {
        Ok(result) => result,
        Err(payload) => Err(Error::transform_panicked(panic_message(&*payload))),
    }
}
