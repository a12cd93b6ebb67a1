//! Test sources and helpers for draining them.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use sluice::{DataSource, Finitude};
use sluice_common::{Error, Result};
use sluice_tape::Tape;

/// Pulls from `source` until it is exhausted.
pub fn drain<S: DataSource>(source: &mut S) -> Result<Vec<S::Item>> {
    let mut out = Vec::new();
    while let Some(example) = source.next()? {
        out.push(example);
    }
    Ok(out)
}

/// Pulls at most `n` elements from `source`.
pub fn take<S: DataSource>(source: &mut S, n: usize) -> Result<Vec<S::Item>> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        match source.next()? {
            Some(example) => out.push(example),
            None => break,
        }
    }
    Ok(out)
}

/// A finite source yielding `1..=len` that counts how many elements were pulled.
///
/// The counter is shared, so it can still be observed after the source was moved
/// into a pipeline.
pub struct CountingSource {
    len: i64,
    next: i64,
    pulls: Arc<AtomicUsize>,
    fail_at: Option<i64>,
}

impl CountingSource {
    pub fn new(len: i64) -> Self {
        CountingSource {
            len,
            next: 1,
            pulls: Arc::new(AtomicUsize::new(0)),
            fail_at: None,
        }
    }

    /// Makes the pull that would yield `value` fail with a source error instead.
    pub fn failing_at(mut self, value: i64) -> Self {
        self.fail_at = Some(value);
        self
    }

    pub fn pull_counter(&self) -> Arc<AtomicUsize> {
        self.pulls.clone()
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

impl DataSource for CountingSource {
    type Item = i64;

    fn next(&mut self) -> Result<Option<i64>> {
        if self.next > self.len {
            return Ok(None);
        }
        if self.fail_at == Some(self.next) {
            return Err(Error::source_error(format!(
                "source failed at {}",
                self.next
            )));
        }
        let value = self.next;
        self.next += 1;
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(value))
    }

    fn reset(&mut self, _reset_rng: bool) -> Result<()> {
        self.next = 1;
        Ok(())
    }

    fn record_position(&self, tape: &mut Tape, _strict: bool) -> Result<()> {
        tape.record(&self.next)
    }

    fn reload_position(&mut self, tape: &mut Tape, _strict: bool) -> Result<()> {
        self.next = tape.read::<i64>()?;
        Ok(())
    }

    fn finitude(&self) -> Finitude {
        Finitude::Finite(self.len.max(0) as usize)
    }
}
