//! The pull contract implemented by every pipeline stage.

use bincode::{Decode, Encode};
use sluice_common::Result;
use sluice_tape::Tape;

/// A value that can flow through a pipeline.
///
/// Elements are moved between stages and threads, never implicitly cloned, and must
/// be encodable so that buffered elements can be written to a checkpoint tape.
pub trait Element: Encode + Decode<()> + Send + 'static {}

impl<T> Element for T where T: Encode + Decode<()> + Send + 'static {}

/// The cardinality class of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finitude {
    /// The source ends after the given number of elements.
    Finite(usize),
    /// The source ends, but its length is not known in advance.
    FiniteUnknown,
    /// The source never ends.
    Infinite,
}

/// A pull-based producer of elements with checkpoint hooks.
///
/// Sources are driven by a single consumer: all methods are called from one thread
/// at a time.
pub trait DataSource: Send {
    type Item;

    /// Returns the next element, or `None` once the source is exhausted.
    ///
    /// Calling `next` again after exhaustion keeps returning `None`.
    fn next(&mut self) -> Result<Option<Self::Item>>;

    /// Rewinds the source to its initial position.
    ///
    /// If `reset_rng` is `true`, random state is also restored to its initial seed, so
    /// the next pass replays the first one; otherwise random state carries on.
    fn reset(&mut self, reset_rng: bool) -> Result<()>;

    /// Appends the current position of the source to `tape`.
    ///
    /// A `strict` record captures enough state to resume at exactly the next element;
    /// a non-strict record may resume at an approximate position.
    fn record_position(&self, tape: &mut Tape, strict: bool) -> Result<()>;

    /// Restores a position written by [`record_position`](Self::record_position) with
    /// the same `strict` flag, reading the values in the order they were recorded.
    fn reload_position(&mut self, tape: &mut Tape, strict: bool) -> Result<()>;

    fn finitude(&self) -> Finitude;
}

impl<S> DataSource for Box<S>
where
    S: DataSource + ?Sized,
{
    type Item = S::Item;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        (**self).next()
    }

    fn reset(&mut self, reset_rng: bool) -> Result<()> {
        (**self).reset(reset_rng)
    }

    fn record_position(&self, tape: &mut Tape, strict: bool) -> Result<()> {
        (**self).record_position(tape, strict)
    }

    fn reload_position(&mut self, tape: &mut Tape, strict: bool) -> Result<()> {
        (**self).reload_position(tape, strict)
    }

    fn finitude(&self) -> Finitude {
        (**self).finitude()
    }
}
