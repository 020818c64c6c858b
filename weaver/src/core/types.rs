//! Shared deterministic types for the refinement loop.
//!
//! These records are the typed payloads exchanged between the orchestrator and
//! agents. They carry no behavior beyond small derived queries and must stay
//! serializable so a finished run can be reported verbatim.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Position in the control-loop state machine.
///
/// `Submitting` covers both remote submission and benchmarking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Planning,
    Coding,
    Testing,
    Debugging,
    Optimizing,
    Submitting,
    Terminal,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Planning => "planning",
            Phase::Coding => "coding",
            Phase::Testing => "testing",
            Phase::Debugging => "debugging",
            Phase::Optimizing => "optimizing",
            Phase::Submitting => "submitting",
            Phase::Terminal => "terminal",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Terminal
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Locally passing and accepted by every enabled external check.
    Solved,
    /// Locally passing; external checks were skipped or failed non-fatally.
    SolvedUnoptimized,
    /// Could not start: no viable code was ever produced.
    Failed,
    /// Did not finish: a bound or non-progress condition ended the run.
    Exhausted,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Solved => "solved",
            RunStatus::SolvedUnoptimized => "solved_unoptimized",
            RunStatus::Failed => "failed",
            RunStatus::Exhausted => "exhausted",
        }
    }

    /// Statuses that must carry code in the final report.
    pub fn requires_code(self) -> bool {
        !matches!(self, RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent variant, used for dispatch bookkeeping and error attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Analyzer,
    Coder,
    Tester,
    Debugger,
    Optimizer,
    Submitter,
    Benchmarker,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Analyzer => "analyzer",
            AgentKind::Coder => "coder",
            AgentKind::Tester => "tester",
            AgentKind::Debugger => "debugger",
            AgentKind::Optimizer => "optimizer",
            AgentKind::Submitter => "submitter",
            AgentKind::Benchmarker => "benchmarker",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The problem handed to a run. Immutable for the run's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemInput {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Code template the solution must follow, when the judge prescribes one.
    pub starting_code: Option<String>,
}

/// Analyzer output: extracted constraints plus an approach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub constraints: Vec<String>,
    pub plan: String,
}

/// A single input/expected-output pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    /// Positional arguments for the entry point.
    pub input: Vec<Value>,
    pub expected: Value,
}

/// Outcome of one case in a test execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub id: String,
    pub passed: bool,
    #[serde(default)]
    pub input: Vec<Value>,
    #[serde(default)]
    pub expected: Value,
    #[serde(default)]
    pub actual: Option<Value>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub time_ms: Option<f64>,
    #[serde(default)]
    pub memory_kb: Option<u64>,
}

/// Structured outcome of the most recent test execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestReport {
    pub cases: Vec<CaseResult>,
}

impl TestReport {
    /// True when no case failed. An empty report passes vacuously.
    pub fn all_passed(&self) -> bool {
        self.cases.iter().all(|case| case.passed)
    }

    pub fn failing(&self) -> impl Iterator<Item = &CaseResult> {
        self.cases.iter().filter(|case| !case.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.failing().count()
    }

    pub fn passed_count(&self) -> usize {
        self.cases.len() - self.failed_count()
    }

    pub fn peak_memory_kb(&self) -> Option<u64> {
        self.cases.iter().filter_map(|case| case.memory_kb).max()
    }
}

/// Debugger output. `replan` asks to revisit Planning instead of patching code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugFeedback {
    pub diagnosis: String,
    pub suggested_fix: String,
    #[serde(default)]
    pub replan: bool,
}

/// Optimizer output. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationFeedback {
    pub analysis: String,
    #[serde(default)]
    pub revised_code: Option<String>,
}

/// Feedback consumed by the next Coder invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feedback {
    Debug(DebugFeedback),
    Optimization(OptimizationFeedback),
}

impl Feedback {
    pub fn is_optimization(&self) -> bool {
        matches!(self, Feedback::Optimization(_))
    }
}

/// Plan rejected by the Debugger, handed back to the Analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedPlan {
    pub plan: String,
    pub diagnosis: String,
}

/// Remote judge verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub accepted: bool,
    #[serde(default)]
    pub runtime_ms: Option<f64>,
    #[serde(default)]
    pub memory_kb: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Metrics for one benchmark suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub suite_id: String,
    pub metrics: BTreeMap<String, f64>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub suites: Vec<SuiteResult>,
}

impl BenchmarkReport {
    /// At least one suite ran and every suite passed.
    pub fn accepted(&self) -> bool {
        !self.suites.is_empty() && self.suites.iter().all(|suite| suite.passed)
    }
}

/// Refinement counters. Debug and optimize bounds are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IterationCounts {
    pub debug: u32,
    pub optimize: u32,
    pub replans: u32,
}

/// One accepted edge of the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: &str, passed: bool) -> CaseResult {
        CaseResult {
            id: id.to_string(),
            passed,
            input: Vec::new(),
            expected: Value::Null,
            actual: None,
            stdout: String::new(),
            error: None,
            time_ms: None,
            memory_kb: Some(if passed { 10 } else { 30 }),
        }
    }

    #[test]
    fn report_counts_failures() {
        let report = TestReport {
            cases: vec![case("a", true), case("b", false), case("c", true)],
        };
        assert!(!report.all_passed());
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.passed_count(), 2);
        assert_eq!(report.peak_memory_kb(), Some(30));
    }

    #[test]
    fn empty_report_passes_vacuously() {
        assert!(TestReport::default().all_passed());
    }

    #[test]
    fn benchmark_requires_at_least_one_suite() {
        assert!(!BenchmarkReport::default().accepted());
        let report = BenchmarkReport {
            suites: vec![SuiteResult {
                suite_id: "smoke".to_string(),
                metrics: BTreeMap::from([("pass_rate".to_string(), 1.0)]),
                passed: true,
            }],
        };
        assert!(report.accepted());
    }

    #[test]
    fn case_result_tolerates_missing_optional_fields() {
        let parsed: CaseResult =
            serde_json::from_str(r#"{"id":"example_1","passed":false}"#).expect("parse");
        assert_eq!(parsed.stdout, "");
        assert_eq!(parsed.error, None);
    }
}
