//! Shared time budget helpers for the run deadline.

use std::time::Duration;

use tokio::time::Instant;

/// Longest deadline a run can be given; limits beyond it are treated as unbounded.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Deadline `limit` after `start`, saturating instead of overflowing `Instant`.
pub fn deadline_after(start: Instant, limit: Duration) -> Instant {
    start
        .checked_add(limit.min(FAR_FUTURE))
        .unwrap_or(start)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Return the remaining time budget until the provided deadline, or `None` once it passed.
pub fn remaining_budget(deadline: Instant) -> Option<Duration> {
    let remaining = deadline.checked_duration_since(Instant::now())?;
    if remaining.is_zero() {
        return None;
    }
    Some(remaining)
}

/// Per-call timeout clamped to what is left of the run.
pub fn call_budget(per_call: Duration, deadline: Instant) -> Option<Duration> {
    remaining_budget(deadline).map(|remaining| remaining.min(per_call))
}
