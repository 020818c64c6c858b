//! Benchmarker: runs final code through one configured suite.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::core::errors::AgentError;
use crate::core::types::SuiteResult;
use crate::io::harness::BenchmarkHarness;

use super::{BenchmarkInput, Benchmarker};

pub struct HarnessBenchmarker {
    harness: Arc<dyn BenchmarkHarness>,
    pass_metric: String,
    pass_threshold: f64,
}

impl HarnessBenchmarker {
    pub fn new(harness: Arc<dyn BenchmarkHarness>, pass_metric: String, pass_threshold: f64) -> Self {
        Self {
            harness,
            pass_metric,
            pass_threshold,
        }
    }
}

#[async_trait]
impl Benchmarker for HarnessBenchmarker {
    #[instrument(skip_all, fields(suite = %input.suite_id))]
    async fn benchmark(&self, input: &BenchmarkInput) -> Result<SuiteResult, AgentError> {
        let metrics = self.harness.run_suite(&input.code, &input.suite_id).await?;
        // A suite that does not report the pass metric has not passed.
        let passed = metrics
            .get(&self.pass_metric)
            .is_some_and(|value| *value >= self.pass_threshold);
        info!(passed, "benchmark suite finished");
        Ok(SuiteResult {
            suite_id: input.suite_id.clone(),
            metrics,
            passed,
        })
    }
}
