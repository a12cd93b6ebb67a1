//! An infinite arithmetic sequence.

use sluice_common::Result;
use sluice_tape::Tape;

use crate::data_source::{DataSource, Finitude};

/// Yields `start`, `start + step`, `start + 2 * step`, ... without end.
///
/// The sequence wraps around on overflow.
pub struct CountSource {
    start: i64,
    step: i64,
    current: i64,
}

impl CountSource {
    pub fn new(start: i64, step: i64) -> Self {
        CountSource {
            start,
            step,
            current: start,
        }
    }
}

impl DataSource for CountSource {
    type Item = i64;

    fn next(&mut self) -> Result<Option<i64>> {
        let value = self.current;
        self.current = self.current.wrapping_add(self.step);
        Ok(Some(value))
    }

    fn reset(&mut self, _reset_rng: bool) -> Result<()> {
        self.current = self.start;
        Ok(())
    }

    fn record_position(&self, tape: &mut Tape, _strict: bool) -> Result<()> {
        tape.record(&self.current)
    }

    fn reload_position(&mut self, tape: &mut Tape, _strict: bool) -> Result<()> {
        self.current = tape.read::<i64>()?;
        Ok(())
    }

    fn finitude(&self) -> Finitude {
        Finitude::Infinite
    }
}
