//! Terminal classification and the structured run report.

use serde::{Deserialize, Serialize};

use crate::core::errors::WorkflowError;
use crate::core::state::WorkflowState;
use crate::core::types::{
    BenchmarkReport, IterationCounts, RunStatus, SubmissionReport, TestReport, TransitionRecord,
};

/// Which external checks the run was configured to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExternalChecks {
    pub submission: bool,
    pub benchmark: bool,
}

/// Status for a locally passing run after the Submitting phase.
///
/// `Solved` needs at least one enabled check and every enabled check accepting.
/// Anything else (skipped, rejected, or errored) is `SolvedUnoptimized`.
pub fn classify_submission(
    checks: ExternalChecks,
    submission: Option<&SubmissionReport>,
    benchmark: Option<&BenchmarkReport>,
) -> RunStatus {
    if !checks.submission && !checks.benchmark {
        return RunStatus::SolvedUnoptimized;
    }
    let submission_ok = !checks.submission || submission.is_some_and(|report| report.accepted);
    let benchmark_ok = !checks.benchmark || benchmark.is_some_and(BenchmarkReport::accepted);
    if submission_ok && benchmark_ok {
        RunStatus::Solved
    } else {
        RunStatus::SolvedUnoptimized
    }
}

/// Everything a caller gets back from a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub problem_id: String,
    pub status: RunStatus,
    pub final_code: Option<String>,
    pub iteration_counts: IterationCounts,
    pub test_report: Option<TestReport>,
    pub submission_report: Option<SubmissionReport>,
    pub benchmark_report: Option<BenchmarkReport>,
    pub error: Option<WorkflowError>,
    pub notes: Vec<String>,
    pub transitions: Vec<TransitionRecord>,
    pub duration_ms: u64,
}

impl RunReport {
    /// Snapshot a finished state. An unfinished state reports `Failed`.
    pub fn from_state(state: &WorkflowState, duration_ms: u64) -> Self {
        Self {
            problem_id: state.problem().id.clone(),
            status: state.status().unwrap_or(RunStatus::Failed),
            final_code: state.code().map(str::to_string),
            iteration_counts: state.counts(),
            test_report: state.test_report().cloned(),
            submission_report: state.submission().cloned(),
            benchmark_report: state.benchmark().cloned(),
            error: state.error().cloned(),
            notes: state.notes().to_vec(),
            transitions: state.transitions().to_vec(),
            duration_ms,
        }
    }
}
