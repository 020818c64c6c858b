//! Stable exit codes for weaver CLI commands.

use crate::core::types::RunStatus;

/// Command succeeded; for `solve`, the run was `Solved`.
pub const OK: i32 = 0;
/// Invalid input, configuration or other errors.
pub const INVALID: i32 = 1;
/// `solve` could not produce any viable code.
pub const FAILED: i32 = 2;
/// `solve` stopped on a bound, no progress or cancellation.
pub const EXHAUSTED: i32 = 3;
/// `solve` passes locally but external checks were skipped or did not accept.
pub const SOLVED_UNOPTIMIZED: i32 = 4;

pub fn for_status(status: RunStatus) -> i32 {
    match status {
        RunStatus::Solved => OK,
        RunStatus::SolvedUnoptimized => SOLVED_UNOPTIMIZED,
        RunStatus::Exhausted => EXHAUSTED,
        RunStatus::Failed => FAILED,
    }
}
