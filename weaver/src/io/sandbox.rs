//! Code-execution collaborator.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::types::{CaseResult, TestCase, TestReport};
use crate::io::backend::CollaboratorError;
use crate::io::process::{build_command, run_command_async};

const CASE_HARNESS: &str = include_str!("harness/run_cases.py");

/// Runs candidate code against test cases.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str, cases: &[TestCase]) -> Result<TestReport, CollaboratorError>;
}

#[derive(Serialize)]
struct HarnessRequest<'a> {
    code: &'a str,
    entry_point: Option<&'a str>,
    cases: &'a [TestCase],
}

/// Runs the embedded case harness through a Python interpreter in a child process.
pub struct ProcessSandbox {
    interpreter: Vec<String>,
    entry_point: Option<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ProcessSandbox {
    pub fn new(
        interpreter: Vec<String>,
        entry_point: Option<String>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            interpreter,
            entry_point,
            timeout,
            output_limit_bytes,
        }
    }
}

#[async_trait]
impl CodeRunner for ProcessSandbox {
    #[instrument(skip_all, fields(cases = cases.len(), code_bytes = code.len()))]
    async fn run(&self, code: &str, cases: &[TestCase]) -> Result<TestReport, CollaboratorError> {
        if cases.is_empty() {
            return Ok(TestReport::default());
        }
        let request = HarnessRequest {
            code,
            entry_point: self.entry_point.as_deref(),
            cases,
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|err| CollaboratorError::Invalid(format!("encode harness request: {err}")))?;

        let mut cmd = build_command(&self.interpreter, &[])
            .map_err(|err| CollaboratorError::Unavailable(format!("{err:#}")))?;
        cmd.arg("-c").arg(CASE_HARNESS);
        let output = run_command_async(cmd, Some(payload), self.timeout, self.output_limit_bytes)
            .await
            .map_err(|err| CollaboratorError::Unavailable(format!("{err:#}")))?;

        // A hung candidate is a failing run, not an unavailable sandbox.
        if output.timed_out {
            let error = format!("time limit exceeded ({}s)", self.timeout.as_secs());
            return Ok(TestReport {
                cases: cases
                    .iter()
                    .map(|case| CaseResult {
                        id: case.id.clone(),
                        passed: false,
                        input: case.input.clone(),
                        expected: case.expected.clone(),
                        actual: None,
                        stdout: String::new(),
                        error: Some(error.clone()),
                        time_ms: None,
                        memory_kb: None,
                    })
                    .collect(),
            });
        }
        if !output.status.success() {
            return Err(CollaboratorError::Unavailable(
                output.failure_summary("sandbox"),
            ));
        }
        if output.stdout_truncated > 0 {
            return Err(CollaboratorError::Invalid(format!(
                "sandbox output truncated by {} bytes",
                output.stdout_truncated
            )));
        }
        let report: TestReport = serde_json::from_slice(&output.stdout)
            .map_err(|err| CollaboratorError::Invalid(format!("parse sandbox report: {err}")))?;
        debug!(
            passed = report.passed_count(),
            failed = report.failed_count(),
            "sandbox finished"
        );
        Ok(report)
    }
}
