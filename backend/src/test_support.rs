//! Test utilities for the queue-admin crate.
//!
//! Compiled for unit tests and, through the `test-support` feature, for the
//! integration suites under `tests/`.

pub mod memory;

pub use memory::{MemoryBackend, MemoryTx};
