//! Deterministic, pure logic shared by the task harness.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod graph;
pub mod kinds;
pub mod naming;
pub mod types;
