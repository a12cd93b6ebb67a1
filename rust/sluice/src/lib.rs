//! Pull-based, checkpointable data pipelines.
//!
//! A pipeline is a chain of [`DataSource`]s: each stage pulls elements from the stage
//! before it and hands them to whoever pulls from it. Every stage can record its
//! position on a [`Tape`](sluice_tape::Tape) and reload it later, which lets a long
//! running job resume exactly where it stopped.
//!
//! # Sources
//!
//! - [`list_source::ListSource`] - replays an in-memory list, optionally shuffled
//! - [`count_source::CountSource`] - an infinite arithmetic sequence
//! - [`map_source::MapSource`] - applies map functions to the elements of an inner
//!   source, sequentially, in order-preserving parallel batches, or asynchronously
//!   in completion order
//!
//! [`pipeline::DataPipelineBuilder`] composes these into a [`pipeline::DataPipeline`].

pub mod count_source;
pub mod data_source;
pub mod list_source;
pub mod map_options;
pub mod map_source;
pub mod pipeline;

mod async_state;

pub use data_source::{DataSource, Element, Finitude};
pub use map_options::{MapMode, MapOptions};
pub use map_source::{MapFn, MapPhase, MapSource};
pub use pipeline::{DataPipeline, DataPipelineBuilder};
