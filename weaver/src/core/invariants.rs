//! Semantic invariants of a workflow state.

use crate::core::state::WorkflowState;
use crate::core::transitions::{LoopLimits, is_allowed};
use crate::core::types::Phase;

/// Check invariants that the type system cannot express:
/// - Counters never exceed their ceilings
/// - Code is never empty once produced
/// - A test report implies code exists
/// - The transition log is a connected path along allowed edges ending at `phase`
/// - Terminal states carry a status, and code when the status requires it
pub fn validate_state(state: &WorkflowState, limits: &LoopLimits) -> Vec<String> {
    let mut errors = Vec::new();
    let counts = state.counts();

    if counts.debug > limits.max_debug_iterations {
        errors.push(format!(
            "debug iterations {} exceed max {}",
            counts.debug, limits.max_debug_iterations
        ));
    }
    if counts.optimize > limits.max_optimize_iterations {
        errors.push(format!(
            "optimize iterations {} exceed max {}",
            counts.optimize, limits.max_optimize_iterations
        ));
    }
    if counts.replans > limits.max_replans {
        errors.push(format!(
            "replans {} exceed max {}",
            counts.replans, limits.max_replans
        ));
    }

    if state.code().is_some_and(|code| code.trim().is_empty()) {
        errors.push("code is empty".to_string());
    }
    if state.test_report().is_some() && state.code().is_none() {
        errors.push("test report without code".to_string());
    }

    let mut at = Phase::Init;
    for (index, record) in state.transitions().iter().enumerate() {
        if record.from != at {
            errors.push(format!(
                "transition {index} starts at {} but phase was {at}",
                record.from
            ));
        }
        if !is_allowed(record.from, record.to) {
            errors.push(format!(
                "transition {index} {} -> {} is not an allowed edge",
                record.from, record.to
            ));
        }
        at = record.to;
    }
    if at != state.phase() {
        errors.push(format!(
            "transition log ends at {at} but phase is {}",
            state.phase()
        ));
    }

    match (state.phase().is_terminal(), state.status()) {
        (true, None) => errors.push("terminal phase without status".to_string()),
        (false, Some(status)) => errors.push(format!("status {status} before terminal phase")),
        (true, Some(status)) if status.requires_code() && state.code().is_none() => {
            errors.push(format!("status {status} without code"));
        }
        _ => {}
    }

    errors
}
