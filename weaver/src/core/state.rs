//! The single mutable aggregate threaded through one run.
//!
//! Fields are private. Agents never see this type; the orchestrator hands them
//! owned input records built from the accessors, and only crate-internal
//! mutators change the state. Each mutation bumps `version`.

use crate::core::errors::WorkflowError;
use crate::core::transitions::{is_allowed, same_code};
use crate::core::types::{
    Analysis, BenchmarkReport, Feedback, IterationCounts, Phase, ProblemInput, RejectedPlan,
    RunStatus, SubmissionReport, TestReport, TransitionRecord,
};

#[derive(Debug, Clone)]
pub struct WorkflowState {
    problem: ProblemInput,
    constraints: Option<Vec<String>>,
    plan: Option<String>,
    code: Option<String>,
    test_report: Option<TestReport>,
    feedback: Option<Feedback>,
    rejected_plan: Option<RejectedPlan>,
    counts: IterationCounts,
    phase: Phase,
    status: Option<RunStatus>,
    error: Option<WorkflowError>,
    /// Most recent code that failed its tests.
    last_failing_code: Option<String>,
    /// Code the optimizer has already reviewed.
    optimized_code: Option<String>,
    code_from_optimization: bool,
    best_passing: Option<(String, TestReport)>,
    submission: Option<SubmissionReport>,
    benchmark: Option<BenchmarkReport>,
    notes: Vec<String>,
    transitions: Vec<TransitionRecord>,
    version: u64,
}

impl WorkflowState {
    pub fn new(problem: ProblemInput) -> Self {
        Self {
            problem,
            constraints: None,
            plan: None,
            code: None,
            test_report: None,
            feedback: None,
            rejected_plan: None,
            counts: IterationCounts::default(),
            phase: Phase::Init,
            status: None,
            error: None,
            last_failing_code: None,
            optimized_code: None,
            code_from_optimization: false,
            best_passing: None,
            submission: None,
            benchmark: None,
            notes: Vec::new(),
            transitions: Vec::new(),
            version: 0,
        }
    }

    pub fn problem(&self) -> &ProblemInput {
        &self.problem
    }

    pub fn constraints(&self) -> &[String] {
        self.constraints.as_deref().unwrap_or_default()
    }

    pub fn plan(&self) -> Option<&str> {
        self.plan.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn test_report(&self) -> Option<&TestReport> {
        self.test_report.as_ref()
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn rejected_plan(&self) -> Option<&RejectedPlan> {
        self.rejected_plan.as_ref()
    }

    pub fn counts(&self) -> IterationCounts {
        self.counts
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> Option<RunStatus> {
        self.status
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        self.error.as_ref()
    }

    pub fn last_failing_code(&self) -> Option<&str> {
        self.last_failing_code.as_deref()
    }

    /// True when the optimizer already reviewed the current code.
    pub fn current_code_optimized(&self) -> bool {
        match (&self.code, &self.optimized_code) {
            (Some(code), Some(reviewed)) => same_code(code, reviewed),
            _ => false,
        }
    }

    pub fn code_from_optimization(&self) -> bool {
        self.code_from_optimization
    }

    pub fn best_passing_code(&self) -> Option<&str> {
        self.best_passing.as_ref().map(|(code, _)| code.as_str())
    }

    pub fn submission(&self) -> Option<&SubmissionReport> {
        self.submission.as_ref()
    }

    pub fn benchmark(&self) -> Option<&BenchmarkReport> {
        self.benchmark.as_ref()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Move along an edge of the state machine, recording the reason.
    pub(crate) fn transition(&mut self, to: Phase, reason: &str) -> Result<(), WorkflowError> {
        let from = self.phase;
        if !is_allowed(from, to) {
            return Err(WorkflowError::IllegalTransition { from, to });
        }
        self.transitions.push(TransitionRecord {
            from,
            to,
            reason: reason.to_string(),
        });
        self.phase = to;
        self.bump();
        Ok(())
    }

    /// Constraints are kept from the first analysis; later analyses only replace the plan.
    pub(crate) fn apply_analysis(&mut self, analysis: Analysis) {
        if self.constraints.is_none() {
            self.constraints = Some(analysis.constraints);
        }
        self.plan = Some(analysis.plan);
        self.rejected_plan = None;
        self.bump();
    }

    /// Replace the candidate. The previous test report no longer describes it.
    pub(crate) fn replace_code(&mut self, code: String, from_optimization: bool) {
        self.code = Some(code);
        self.test_report = None;
        self.code_from_optimization = from_optimization;
        self.bump();
    }

    pub(crate) fn record_test_report(&mut self, report: TestReport) {
        if let Some(code) = &self.code {
            if report.all_passed() {
                self.best_passing = Some((code.clone(), report.clone()));
            } else {
                self.last_failing_code = Some(code.clone());
            }
        }
        self.test_report = Some(report);
        self.bump();
    }

    pub(crate) fn set_feedback(&mut self, feedback: Feedback) {
        self.feedback = Some(feedback);
        self.bump();
    }

    pub(crate) fn clear_feedback(&mut self) {
        if self.feedback.take().is_some() {
            self.bump();
        }
    }

    pub(crate) fn request_replan(&mut self, rejected: RejectedPlan) {
        self.rejected_plan = Some(rejected);
        self.counts.replans += 1;
        self.bump();
    }

    pub(crate) fn enter_debugging(&mut self) {
        self.counts.debug += 1;
        self.bump();
    }

    /// Count an optimization round and mark the current code as reviewed.
    pub(crate) fn enter_optimizing(&mut self) {
        self.counts.optimize += 1;
        self.optimized_code = self.code.clone();
        self.bump();
    }

    /// Put back the last passing candidate and its report. Returns false when none exists.
    pub(crate) fn restore_best_passing(&mut self) -> bool {
        let Some((code, report)) = self.best_passing.clone() else {
            return false;
        };
        self.code = Some(code);
        self.test_report = Some(report);
        self.code_from_optimization = false;
        self.feedback = None;
        self.bump();
        true
    }

    pub(crate) fn record_submission(&mut self, report: SubmissionReport) {
        self.submission = Some(report);
        self.bump();
    }

    pub(crate) fn record_benchmark(&mut self, report: BenchmarkReport) {
        self.benchmark = Some(report);
        self.bump();
    }

    pub(crate) fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
        self.bump();
    }

    /// Enter `Terminal` with a classification. A status that requires code is
    /// downgraded to `Failed` when no code exists.
    pub(crate) fn finish(&mut self, status: RunStatus, error: Option<WorkflowError>, reason: &str) {
        if self.phase.is_terminal() {
            return;
        }
        let status = if status.requires_code() && self.code.is_none() {
            RunStatus::Failed
        } else {
            status
        };
        self.transitions.push(TransitionRecord {
            from: self.phase,
            to: Phase::Terminal,
            reason: reason.to_string(),
        });
        self.phase = Phase::Terminal;
        self.status = Some(status);
        self.error = error;
        self.bump();
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CaseResult;

    fn problem() -> ProblemInput {
        ProblemInput {
            id: "two-sum".to_string(),
            title: "Two Sum".to_string(),
            description: "Return indices of two numbers adding to target.".to_string(),
            starting_code: None,
        }
    }

    fn report(passed: bool) -> TestReport {
        TestReport {
            cases: vec![CaseResult {
                id: "example_1".to_string(),
                passed,
                input: Vec::new(),
                expected: serde_json::Value::Null,
                actual: None,
                stdout: String::new(),
                error: None,
                time_ms: None,
                memory_kb: None,
            }],
        }
    }

    #[test]
    fn replacing_code_invalidates_report() {
        let mut state = WorkflowState::new(problem());
        state.replace_code("v1".to_string(), false);
        state.record_test_report(report(true));
        assert!(state.test_report().is_some());
        state.replace_code("v2".to_string(), false);
        assert!(state.test_report().is_none());
    }

    #[test]
    fn constraints_are_set_once() {
        let mut state = WorkflowState::new(problem());
        state.apply_analysis(Analysis {
            constraints: vec!["n <= 10^4".to_string()],
            plan: "hash map".to_string(),
        });
        state.apply_analysis(Analysis {
            constraints: vec!["different".to_string()],
            plan: "two pointers".to_string(),
        });
        assert_eq!(state.constraints(), ["n <= 10^4".to_string()]);
        assert_eq!(state.plan(), Some("two pointers"));
    }

    #[test]
    fn illegal_transition_is_rejected_without_mutation() {
        let mut state = WorkflowState::new(problem());
        let version = state.version();
        let err = state
            .transition(Phase::Testing, "skip ahead")
            .expect_err("init cannot jump to testing");
        assert_eq!(
            err,
            WorkflowError::IllegalTransition {
                from: Phase::Init,
                to: Phase::Testing
            }
        );
        assert_eq!(state.phase(), Phase::Init);
        assert_eq!(state.version(), version);
    }

    #[test]
    fn transitions_are_recorded_and_versioned() {
        let mut state = WorkflowState::new(problem());
        state.transition(Phase::Planning, "start").expect("edge");
        state.transition(Phase::Coding, "plan ready").expect("edge");
        assert_eq!(state.transitions().len(), 2);
        assert_eq!(state.transitions()[1].from, Phase::Planning);
        assert_eq!(state.version(), 2);
    }

    #[test]
    fn finish_without_code_downgrades_to_failed() {
        let mut state = WorkflowState::new(problem());
        state.finish(RunStatus::Exhausted, None, "bound");
        assert_eq!(state.status(), Some(RunStatus::Failed));
        assert_eq!(state.phase(), Phase::Terminal);
    }

    #[test]
    fn finish_is_final() {
        let mut state = WorkflowState::new(problem());
        state.replace_code("v1".to_string(), false);
        state.finish(RunStatus::Exhausted, None, "bound");
        state.finish(RunStatus::Solved, None, "late");
        assert_eq!(state.status(), Some(RunStatus::Exhausted));
    }

    #[test]
    fn best_passing_survives_a_broken_rewrite() {
        let mut state = WorkflowState::new(problem());
        state.replace_code("slow".to_string(), false);
        state.record_test_report(report(true));
        state.enter_optimizing();
        assert!(state.current_code_optimized());
        state.replace_code("fast but wrong".to_string(), true);
        state.record_test_report(report(false));
        assert_eq!(state.last_failing_code(), Some("fast but wrong"));

        assert!(state.restore_best_passing());
        assert_eq!(state.code(), Some("slow"));
        assert!(state.test_report().is_some_and(TestReport::all_passed));
        assert!(!state.code_from_optimization());
    }

    #[test]
    fn replan_counts_and_clears_on_new_analysis() {
        let mut state = WorkflowState::new(problem());
        state.request_replan(RejectedPlan {
            plan: "greedy".to_string(),
            diagnosis: "counterexample".to_string(),
        });
        assert_eq!(state.counts().replans, 1);
        state.apply_analysis(Analysis {
            constraints: Vec::new(),
            plan: "dp".to_string(),
        });
        assert!(state.rejected_plan().is_none());
    }
}
