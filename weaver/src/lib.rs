//! Iterative refinement loop for programming problems.
//!
//! A run coordinates specialized agents (analyze, code, test, debug,
//! optimize, submit, benchmark) until a working solution is produced or a
//! bound is exhausted. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (data model, transition table,
//!   invariants, retry and deadline policy). No I/O, fully testable in isolation.
//! - **[`agents`]**: One trait per agent variant, the single dispatch point and
//!   the default implementations.
//! - **[`io`]**: Side-effecting collaborators (language-model backend, code
//!   sandbox, judge, benchmark harness, configuration, reports).
//!
//! [`orchestrator`] drives one problem through the state machine.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
