//! Benchmark harness interface.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use crate::io::backend::CollaboratorError;
use crate::io::process::{build_command, run_command_async};

#[async_trait]
pub trait BenchmarkHarness: Send + Sync {
    /// Metric name to value for one suite.
    async fn run_suite(
        &self,
        code: &str,
        suite_id: &str,
    ) -> Result<BTreeMap<String, f64>, CollaboratorError>;
}

/// Harness reached through a command: code on stdin, suite id as the last argument,
/// a flat `{metric: number}` JSON object on stdout.
pub struct CommandHarness {
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandHarness {
    pub fn new(argv: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            argv,
            timeout,
            output_limit_bytes,
        }
    }
}

#[async_trait]
impl BenchmarkHarness for CommandHarness {
    #[instrument(skip_all, fields(suite = suite_id))]
    async fn run_suite(
        &self,
        code: &str,
        suite_id: &str,
    ) -> Result<BTreeMap<String, f64>, CollaboratorError> {
        let mut cmd = build_command(&self.argv, &[])
            .map_err(|err| CollaboratorError::Unavailable(format!("{err:#}")))?;
        cmd.arg(suite_id);
        let output = run_command_async(
            cmd,
            Some(code.as_bytes().to_vec()),
            self.timeout,
            self.output_limit_bytes,
        )
        .await
        .map_err(|err| CollaboratorError::Unavailable(format!("{err:#}")))?;
        if output.timed_out {
            return Err(CollaboratorError::Timeout(format!(
                "benchmark suite {suite_id} timed out"
            )));
        }
        if !output.status.success() {
            return Err(CollaboratorError::Unavailable(
                output.failure_summary("benchmark harness"),
            ));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|err| CollaboratorError::Invalid(format!("parse suite metrics: {err}")))
    }
}
