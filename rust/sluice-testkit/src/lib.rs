//! Test utilities and helpers for the sluice crates.
//!
//! This crate provides:
//! - Sources that count how often they are pulled and can be told to fail
//! - Map functions with random latency, injected failures and concurrency probes
//! - Tape persistence round trips through temporary files
//!
//! # Usage
//!
//! This crate is intended for the integration tests of the sluice crates.

pub mod sources;
pub mod tapes;
pub mod transforms;
