//! Transition table and next-phase decisions.
//!
//! Every decision here is a pure function of the current phase, the last agent
//! outcome and the counters, so each loop bound and escape path can be tested
//! without running agents.

use crate::core::types::{DebugFeedback, OptimizationFeedback, Phase};

/// Allowed non-terminal edges. Any non-terminal phase may also move to `Terminal`.
pub const EDGES: &[(Phase, Phase)] = &[
    (Phase::Init, Phase::Planning),
    (Phase::Planning, Phase::Coding),
    (Phase::Coding, Phase::Testing),
    // Optimized rewrite failed or repeated the passing code.
    (Phase::Coding, Phase::Submitting),
    (Phase::Testing, Phase::Debugging),
    (Phase::Testing, Phase::Optimizing),
    (Phase::Testing, Phase::Submitting),
    (Phase::Debugging, Phase::Coding),
    // Replan escape hatch, only on an explicit signal.
    (Phase::Debugging, Phase::Planning),
    (Phase::Optimizing, Phase::Coding),
    (Phase::Optimizing, Phase::Submitting),
];

pub fn is_allowed(from: Phase, to: Phase) -> bool {
    if to == Phase::Terminal {
        return !from.is_terminal();
    }
    EDGES.contains(&(from, to))
}

/// Loop ceilings relevant to transition decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    pub max_debug_iterations: u32,
    pub max_optimize_iterations: u32,
    pub optimization_enabled: bool,
    pub max_replans: u32,
}

/// Facts about a finished test run needed to pick the next phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestingFacts {
    pub all_passed: bool,
    pub debug_iterations: u32,
    pub optimize_iterations: u32,
    /// The optimizer already reviewed exactly this code.
    pub already_optimized: bool,
    /// The tested code came from optimization feedback.
    pub from_optimization: bool,
    /// A previously passing candidate is available to fall back on.
    pub has_passing_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterTesting {
    Debug,
    Optimize,
    Submit,
    /// An optimized rewrite broke the tests; restore the passing code and submit.
    RestorePassing,
    /// Failing, and the debug bound is used up.
    DebugBoundReached,
}

pub fn after_testing(facts: &TestingFacts, limits: &LoopLimits) -> AfterTesting {
    if facts.all_passed {
        let optimize = limits.optimization_enabled
            && !facts.already_optimized
            && facts.optimize_iterations < limits.max_optimize_iterations;
        return if optimize {
            AfterTesting::Optimize
        } else {
            AfterTesting::Submit
        };
    }
    if facts.from_optimization && facts.has_passing_fallback {
        return AfterTesting::RestorePassing;
    }
    if facts.debug_iterations < limits.max_debug_iterations {
        AfterTesting::Debug
    } else {
        AfterTesting::DebugBoundReached
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterDebugging {
    Code,
    Replan,
}

/// Replanning requires the explicit signal and a remaining replan allowance.
pub fn after_debugging(feedback: &DebugFeedback, replans: u32, limits: &LoopLimits) -> AfterDebugging {
    if feedback.replan && replans < limits.max_replans {
        AfterDebugging::Replan
    } else {
        AfterDebugging::Code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterOptimizing {
    Code,
    Submit,
}

/// Optimization only loops back when it proposes code that differs from `current`.
pub fn after_optimizing(feedback: &OptimizationFeedback, current: &str) -> AfterOptimizing {
    match feedback.revised_code.as_deref() {
        Some(revised) if !same_code(revised, current) => AfterOptimizing::Code,
        _ => AfterOptimizing::Submit,
    }
}

/// Code identity used for no-progress detection. Surrounding whitespace is ignored.
pub fn same_code(a: &str, b: &str) -> bool {
    a.trim() == b.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LoopLimits {
        LoopLimits {
            max_debug_iterations: 2,
            max_optimize_iterations: 1,
            optimization_enabled: true,
            max_replans: 1,
        }
    }

    fn facts(all_passed: bool) -> TestingFacts {
        TestingFacts {
            all_passed,
            debug_iterations: 0,
            optimize_iterations: 0,
            already_optimized: false,
            from_optimization: false,
            has_passing_fallback: false,
        }
    }

    #[test]
    fn terminal_is_reachable_from_every_live_phase_only() {
        for phase in [
            Phase::Init,
            Phase::Planning,
            Phase::Coding,
            Phase::Testing,
            Phase::Debugging,
            Phase::Optimizing,
            Phase::Submitting,
        ] {
            assert!(is_allowed(phase, Phase::Terminal), "{phase} -> terminal");
        }
        assert!(!is_allowed(Phase::Terminal, Phase::Terminal));
        assert!(!is_allowed(Phase::Terminal, Phase::Planning));
    }

    #[test]
    fn planning_is_only_revisited_from_debugging() {
        let into_planning: Vec<Phase> = EDGES
            .iter()
            .filter(|(_, to)| *to == Phase::Planning)
            .map(|(from, _)| *from)
            .collect();
        assert_eq!(into_planning, vec![Phase::Init, Phase::Debugging]);
        assert!(!is_allowed(Phase::Testing, Phase::Planning));
        assert!(!is_allowed(Phase::Optimizing, Phase::Testing));
    }

    #[test]
    fn failing_tests_debug_until_bound() {
        assert_eq!(after_testing(&facts(false), &limits()), AfterTesting::Debug);
        let used_up = TestingFacts {
            debug_iterations: 2,
            ..facts(false)
        };
        assert_eq!(
            after_testing(&used_up, &limits()),
            AfterTesting::DebugBoundReached
        );
    }

    #[test]
    fn passing_tests_optimize_once_per_code() {
        assert_eq!(after_testing(&facts(true), &limits()), AfterTesting::Optimize);
        let reviewed = TestingFacts {
            already_optimized: true,
            ..facts(true)
        };
        assert_eq!(after_testing(&reviewed, &limits()), AfterTesting::Submit);
        let spent = TestingFacts {
            optimize_iterations: 1,
            ..facts(true)
        };
        assert_eq!(after_testing(&spent, &limits()), AfterTesting::Submit);
    }

    #[test]
    fn disabled_optimization_submits_directly() {
        let disabled = LoopLimits {
            optimization_enabled: false,
            ..limits()
        };
        assert_eq!(after_testing(&facts(true), &disabled), AfterTesting::Submit);
    }

    #[test]
    fn broken_optimization_restores_passing_code() {
        let broken = TestingFacts {
            from_optimization: true,
            has_passing_fallback: true,
            debug_iterations: 2,
            ..facts(false)
        };
        assert_eq!(
            after_testing(&broken, &limits()),
            AfterTesting::RestorePassing
        );
    }

    #[test]
    fn debug_bound_is_independent_of_optimize_bound() {
        let spent_optimize = TestingFacts {
            optimize_iterations: 1,
            ..facts(false)
        };
        assert_eq!(
            after_testing(&spent_optimize, &limits()),
            AfterTesting::Debug
        );
    }

    #[test]
    fn replan_needs_signal_and_allowance() {
        let mut feedback = DebugFeedback {
            diagnosis: "greedy choice is wrong".to_string(),
            suggested_fix: "use dynamic programming".to_string(),
            replan: false,
        };
        assert_eq!(after_debugging(&feedback, 0, &limits()), AfterDebugging::Code);
        feedback.replan = true;
        assert_eq!(
            after_debugging(&feedback, 0, &limits()),
            AfterDebugging::Replan
        );
        assert_eq!(after_debugging(&feedback, 1, &limits()), AfterDebugging::Code);
    }

    #[test]
    fn optimizer_without_new_code_submits() {
        let none = OptimizationFeedback {
            analysis: "already optimal".to_string(),
            revised_code: None,
        };
        assert_eq!(after_optimizing(&none, "code"), AfterOptimizing::Submit);
        let same = OptimizationFeedback {
            revised_code: Some("code\n".to_string()),
            ..none.clone()
        };
        assert_eq!(after_optimizing(&same, "code"), AfterOptimizing::Submit);
        let changed = OptimizationFeedback {
            revised_code: Some("faster code".to_string()),
            ..none
        };
        assert_eq!(after_optimizing(&changed, "code"), AfterOptimizing::Code);
    }
}
