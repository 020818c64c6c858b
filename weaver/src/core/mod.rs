//! Deterministic, pure logic shared by the control loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod errors;
pub mod invariants;
pub mod outcome;
pub mod retry;
pub mod state;
pub mod transitions;
pub mod types;
