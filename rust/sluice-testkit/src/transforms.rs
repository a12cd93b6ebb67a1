//! Map functions for exercising map sources under concurrency.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use sluice_common::{Error, Result};

/// Wraps `f` so that every call first sleeps for a random time up to `max_delay`.
///
/// The generator is seeded from `seed`. Clones copy its state, so every clone draws
/// the same sequence of delays from the point it was cloned.
pub fn jittered<T, F>(
    max_delay: Duration,
    seed: u64,
    mut f: F,
) -> impl FnMut(T) -> Result<Option<T>> + Clone + Send + 'static
where
    T: 'static,
    F: FnMut(T) -> Result<Option<T>> + Clone + Send + 'static,
{
    let mut rng = fastrand::Rng::with_seed(seed);
    let max_micros = max_delay.as_micros() as u64;
    move |example| {
        std::thread::sleep(Duration::from_micros(rng.u64(0..=max_micros)));
        f(example)
    }
}

/// Returns a map function that passes elements through and fails on `bad`.
pub fn fail_on(bad: i64) -> impl FnMut(i64) -> Result<Option<i64>> + Clone + Send + 'static {
    move |x| {
        if x == bad {
            Err(Error::transform(format!("cannot map {x}")))
        } else {
            Ok(Some(x))
        }
    }
}

/// Tracks how many map calls run at the same time.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    inner: Arc<ProbeCounters>,
}

#[derive(Debug, Default)]
struct ProbeCounters {
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest number of simultaneous calls observed so far.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Wraps `f` so that its calls are counted by this probe.
    pub fn wrap<T, F>(&self, mut f: F) -> impl FnMut(T) -> Result<Option<T>> + Clone + Send + 'static
    where
        T: 'static,
        F: FnMut(T) -> Result<Option<T>> + Clone + Send + 'static,
    {
        let probe = self.clone();
        move |example| {
            let _guard = probe.enter();
            f(example)
        }
    }

    fn enter(&self) -> ProbeGuard<'_> {
        let current = self.inner.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(current, Ordering::SeqCst);
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        ProbeGuard(&self.inner)
    }
}

struct ProbeGuard<'a>(&'a ProbeCounters);

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}
