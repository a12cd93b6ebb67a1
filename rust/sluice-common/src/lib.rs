//! Core definitions shared by all sluice-* crates: the error type, the result alias
//! and argument verification helpers.

pub mod error;
pub mod macros;
pub mod result;

pub use error::{Error, ErrorKind};
pub use result::Result;
