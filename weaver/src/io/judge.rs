//! Remote judge interface.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::core::types::SubmissionReport;
use crate::io::backend::CollaboratorError;
use crate::io::process::{build_command, run_command_async};

#[async_trait]
pub trait Judge: Send + Sync {
    async fn submit(&self, code: &str) -> Result<SubmissionReport, CollaboratorError>;
}

/// Judge reached through a command: code on stdin, a `SubmissionReport` JSON on stdout.
///
/// `{problem}` in any argument is replaced by the problem id.
pub struct CommandJudge {
    argv: Vec<String>,
    problem_id: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandJudge {
    pub fn new(
        argv: Vec<String>,
        problem_id: String,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            argv,
            problem_id,
            timeout,
            output_limit_bytes,
        }
    }
}

#[async_trait]
impl Judge for CommandJudge {
    #[instrument(skip_all, fields(problem = %self.problem_id))]
    async fn submit(&self, code: &str) -> Result<SubmissionReport, CollaboratorError> {
        let cmd = build_command(&self.argv, &[("problem", self.problem_id.as_str())])
            .map_err(|err| CollaboratorError::Unavailable(format!("{err:#}")))?;
        let output = run_command_async(
            cmd,
            Some(code.as_bytes().to_vec()),
            self.timeout,
            self.output_limit_bytes,
        )
        .await
        .map_err(|err| CollaboratorError::Unavailable(format!("{err:#}")))?;
        if output.timed_out {
            return Err(CollaboratorError::Timeout("judge command timed out".to_string()));
        }
        if !output.status.success() {
            return Err(CollaboratorError::Unavailable(output.failure_summary("judge")));
        }
        let report: SubmissionReport = serde_json::from_slice(&output.stdout)
            .map_err(|err| CollaboratorError::Invalid(format!("parse judge verdict: {err}")))?;
        info!(accepted = report.accepted, runtime_ms = ?report.runtime_ms, "judge verdict");
        Ok(report)
    }
}
