//! Configuration of a [`MapSource`](crate::map_source::MapSource).

/// Upper bound for `num_parallel_calls`; each parallel call owns a worker thread.
pub const MAX_PARALLEL_CALLS: usize = 1024;

/// Options controlling how a map source executes its map functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapOptions {
    /// Number of elements processed concurrently. `0` and `1` both mean sequential
    /// processing on the caller's thread.
    pub num_parallel_calls: usize,
    /// If `true`, results are returned in the order of the input elements. If
    /// `false` (and `num_parallel_calls > 1`), results are returned as soon as they
    /// are ready. Ignored for sequential processing, which is always ordered.
    pub deterministic: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            num_parallel_calls: 1,
            deterministic: true,
        }
    }
}

impl MapOptions {
    pub fn with_num_parallel_calls(mut self, num_parallel_calls: usize) -> Self {
        self.num_parallel_calls = num_parallel_calls;
        self
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Number of map function slots needed: one per parallel call, at least one.
    pub fn num_slots(&self) -> usize {
        self.num_parallel_calls.max(1)
    }

    /// The execution strategy selected by these options.
    pub fn mode(&self) -> MapMode {
        if self.num_parallel_calls <= 1 {
            MapMode::Sequential
        } else if self.deterministic {
            MapMode::DeterministicParallel
        } else {
            MapMode::Async
        }
    }

    /// Validates the options and returns an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_parallel_calls > MAX_PARALLEL_CALLS {
            return Err(format!(
                "num_parallel_calls must not exceed {MAX_PARALLEL_CALLS}, got {}",
                self.num_parallel_calls
            ));
        }
        Ok(())
    }
}

/// Execution strategy of a map source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// One element at a time on the caller's thread.
    Sequential,
    /// Batches of up to `num_parallel_calls` elements mapped concurrently; output order
    /// matches input order.
    DeterministicParallel,
    /// Up to `num_parallel_calls` elements in flight on worker threads; output order is
    /// completion order.
    Async,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selection() {
        let options = MapOptions::default();
        assert_eq!(options.mode(), MapMode::Sequential);
        assert_eq!(options.num_slots(), 1);

        let options = MapOptions::default().with_num_parallel_calls(0);
        assert_eq!(options.mode(), MapMode::Sequential);
        assert_eq!(options.num_slots(), 1);

        // A single parallel call has nothing to reorder.
        let options = MapOptions::default()
            .with_num_parallel_calls(1)
            .with_deterministic(false);
        assert_eq!(options.mode(), MapMode::Sequential);

        let options = MapOptions::default().with_num_parallel_calls(4);
        assert_eq!(options.mode(), MapMode::DeterministicParallel);
        assert_eq!(options.num_slots(), 4);

        let options = options.with_deterministic(false);
        assert_eq!(options.mode(), MapMode::Async);
    }

    #[test]
    fn test_validate() {
        assert!(MapOptions::default().validate().is_ok());
        assert!(
            MapOptions::default()
                .with_num_parallel_calls(MAX_PARALLEL_CALLS + 1)
                .validate()
                .is_err()
        );
    }
}
