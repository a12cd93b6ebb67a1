//! A source that replays an in-memory list of elements.

use sluice_common::{Error, Result};
use sluice_tape::Tape;

use crate::data_source::{DataSource, Finitude};

/// Yields clones of the elements of a list, in order or in a seeded random order.
///
/// A shuffled list draws a new permutation on every reset. `reset(true)` restores the
/// initial seed first, so the next pass repeats the first permutation.
pub struct ListSource<T> {
    items: Vec<T>,
    order: Vec<usize>,
    pos: usize,
    shuffle: Option<Shuffle>,
}

struct Shuffle {
    seed: u64,
    rng: fastrand::Rng,
}

impl<T> ListSource<T>
where
    T: Clone + Send,
{
    pub fn new(items: Vec<T>) -> Self {
        let order = (0..items.len()).collect();
        ListSource {
            items,
            order,
            pos: 0,
            shuffle: None,
        }
    }

    pub fn shuffled(items: Vec<T>, seed: u64) -> Self {
        let mut source = Self::new(items);
        let mut rng = fastrand::Rng::with_seed(seed);
        rng.shuffle(&mut source.order);
        source.shuffle = Some(Shuffle { seed, rng });
        source
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of elements returned in the current pass.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<T> DataSource for ListSource<T>
where
    T: Clone + Send,
{
    type Item = T;

    fn next(&mut self) -> Result<Option<T>> {
        let Some(&index) = self.order.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        Ok(Some(self.items[index].clone()))
    }

    fn reset(&mut self, reset_rng: bool) -> Result<()> {
        self.pos = 0;
        if let Some(shuffle) = &mut self.shuffle {
            if reset_rng {
                shuffle.rng = fastrand::Rng::with_seed(shuffle.seed);
            }
            self.order = (0..self.items.len()).collect();
            shuffle.rng.shuffle(&mut self.order);
        }
        Ok(())
    }

    fn record_position(&self, tape: &mut Tape, _strict: bool) -> Result<()> {
        tape.record(&(self.pos as u64))?;
        if let Some(shuffle) = &self.shuffle {
            let order: Vec<u64> = self.order.iter().map(|&i| i as u64).collect();
            tape.record(&order)?;
            tape.record(&shuffle.rng.get_seed())?;
        }
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape, _strict: bool) -> Result<()> {
        let pos = tape.read::<u64>()? as usize;
        if pos > self.items.len() {
            return Err(Error::corrupt_tape(format!(
                "list position {pos} exceeds list length {}",
                self.items.len()
            )));
        }
        if let Some(shuffle) = &mut self.shuffle {
            let order = tape.read::<Vec<u64>>()?;
            let rng_state = tape.read::<u64>()?;
            if order.len() != self.items.len()
                || order.iter().any(|&i| i as usize >= self.items.len())
            {
                return Err(Error::corrupt_tape("list order does not match the list"));
            }
            self.order = order.into_iter().map(|i| i as usize).collect();
            shuffle.rng = fastrand::Rng::with_seed(rng_state);
        }
        self.pos = pos;
        Ok(())
    }

    fn finitude(&self) -> Finitude {
        Finitude::Finite(self.items.len())
    }
}
