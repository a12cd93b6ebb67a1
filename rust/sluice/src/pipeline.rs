//! A builder-style facade over chains of [`DataSource`]s.
//!
//! ```ignore
//! let mut pipeline = sluice::pipeline::read_list(vec![1i64, 2, 3, 4, 5])
//!     .map_fn(|x| Ok((x % 2 == 0).then_some(x * 2)), MapOptions::default())?
//!     .and_return();
//! let doubled = pipeline.by_ref().collect::<Result<Vec<_>>>()?;
//! ```

use sluice_common::{Result, try_or_ret_some_err};
use sluice_tape::Tape;

use crate::{
    count_source::CountSource,
    data_source::{DataSource, Element, Finitude},
    list_source::ListSource,
    map_options::MapOptions,
    map_source::{MapFn, MapSource},
};

type BoxedSource<T> = Box<dyn DataSource<Item = T>>;

/// Starts a pipeline that replays `items` in order.
pub fn read_list<T>(items: Vec<T>) -> DataPipelineBuilder<T>
where
    T: Element + Clone,
{
    DataPipelineBuilder::from_source(ListSource::new(items))
}

/// Starts a pipeline that replays `items` in a random order drawn from `seed`.
pub fn read_shuffled_list<T>(items: Vec<T>, seed: u64) -> DataPipelineBuilder<T>
where
    T: Element + Clone,
{
    DataPipelineBuilder::from_source(ListSource::shuffled(items, seed))
}

/// Starts an infinite pipeline yielding `start`, `start + step`, ...
pub fn count(start: i64, step: i64) -> DataPipelineBuilder<i64> {
    DataPipelineBuilder::from_source(CountSource::new(start, step))
}

pub struct DataPipelineBuilder<T> {
    source: BoxedSource<T>,
}

impl<T> DataPipelineBuilder<T>
where
    T: Element,
{
    pub fn from_source<S>(source: S) -> Self
    where
        S: DataSource<Item = T> + 'static,
    {
        DataPipelineBuilder {
            source: Box::new(source),
        }
    }

    /// Appends a map stage with one map function per slot.
    ///
    /// See [`MapSource::new`].
    pub fn map(self, fns: Vec<MapFn<T>>, options: MapOptions) -> Result<Self> {
        let source = MapSource::new(self.source, fns, options)?;
        Ok(Self::from_source(source))
    }

    /// Appends a map stage whose slots each own a clone of `f`.
    pub fn map_fn<F>(self, f: F, options: MapOptions) -> Result<Self>
    where
        F: FnMut(T) -> Result<Option<T>> + Clone + Send + 'static,
    {
        let source = MapSource::from_fn(self.source, f, options)?;
        Ok(Self::from_source(source))
    }

    pub fn and_return(self) -> DataPipeline<T> {
        DataPipeline {
            source: self.source,
        }
    }
}

/// A built pipeline. Iterating it pulls from the last stage.
pub struct DataPipeline<T> {
    source: BoxedSource<T>,
}

impl<T> DataPipeline<T>
where
    T: Element,
{
    /// Returns the next element, or `None` once the pipeline is exhausted.
    pub fn read(&mut self) -> Result<Option<T>> {
        self.source.next()
    }

    /// Rewinds every stage. See [`DataSource::reset`].
    pub fn reset(&mut self, reset_rng: bool) -> Result<()> {
        self.source.reset(reset_rng)
    }

    /// Records the position of every stage on a new tape.
    pub fn state(&self, strict: bool) -> Result<Tape> {
        let mut tape = Tape::new();
        self.source.record_position(&mut tape, strict)?;
        Ok(tape)
    }

    /// Restores a position captured by [`state`](Self::state) with the same `strict`
    /// flag. The tape is read from its start.
    pub fn load_state(&mut self, tape: &mut Tape, strict: bool) -> Result<()> {
        tape.rewind();
        self.source.reload_position(tape, strict)
    }

    pub fn finitude(&self) -> Finitude {
        self.source.finitude()
    }
}

impl<T> Iterator for DataPipeline<T>
where
    T: Element,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let example = try_or_ret_some_err!(self.read());
        example.map(Ok)
    }
}
