//! Deterministic, pure logic shared by the loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and values and return deterministic outputs suitable for tests.

pub mod naming;
pub mod progress;
pub mod types;
