//! Agent capability set.
//!
//! Each variant is its own trait with a typed input record and a typed output.
//! [`AgentRequest`] and [`AgentResponse`] wrap them in one tagged union so the
//! orchestrator has a single exhaustive dispatch point ([`AgentSet::dispatch`])
//! and one retry path for every variant.
//!
//! Inputs are owned copies of the state slice an agent may read. Agents never
//! see the workflow state itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::core::errors::AgentError;
use crate::core::types::{
    AgentKind, Analysis, DebugFeedback, Feedback, OptimizationFeedback, ProblemInput,
    RejectedPlan, SubmissionReport, SuiteResult, TestReport,
};
use crate::io::backend::{Backend, CommandBackend, CompletionConfig, ThrottledBackend};
use crate::io::config::WeaverConfig;
use crate::io::harness::CommandHarness;
use crate::io::judge::CommandJudge;
use crate::io::prompt::PromptBuilder;
use crate::io::rate_limit::RateLimiter;
use crate::io::sandbox::ProcessSandbox;

use self::analyzer::LlmAnalyzer;
use self::benchmarker::HarnessBenchmarker;
use self::coder::LlmCoder;
use self::debugger::LlmDebugger;
use self::optimizer::LlmOptimizer;
use self::submitter::JudgeSubmitter;
use self::tester::CaseTester;

pub mod analyzer;
pub mod benchmarker;
pub mod coder;
pub mod debugger;
pub mod optimizer;
pub mod parse;
pub mod submitter;
pub mod tester;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeInput {
    pub problem: ProblemInput,
    /// Present when the debugger rejected the previous plan.
    pub rejected: Option<RejectedPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeInput {
    pub problem: ProblemInput,
    pub plan: String,
    pub constraints: Vec<String>,
    pub prior_code: Option<String>,
    pub feedback: Option<Feedback>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestInput {
    pub problem: ProblemInput,
    pub constraints: Vec<String>,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugInput {
    pub problem: ProblemInput,
    pub plan: String,
    pub code: String,
    pub report: TestReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeInput {
    pub problem: ProblemInput,
    pub constraints: Vec<String>,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitInput {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkInput {
    pub code: String,
    pub suite_id: String,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, input: &AnalyzeInput) -> Result<Analysis, AgentError>;
}

#[async_trait]
pub trait Coder: Send + Sync {
    /// Returns the full candidate code; never empty on success.
    async fn code(&self, input: &CodeInput) -> Result<String, AgentError>;
}

#[async_trait]
pub trait Tester: Send + Sync {
    async fn test(&self, input: &TestInput) -> Result<TestReport, AgentError>;
}

#[async_trait]
pub trait Debugger: Send + Sync {
    async fn debug(&self, input: &DebugInput) -> Result<DebugFeedback, AgentError>;
}

#[async_trait]
pub trait Optimizer: Send + Sync {
    async fn optimize(&self, input: &OptimizeInput) -> Result<OptimizationFeedback, AgentError>;
}

#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, input: &SubmitInput) -> Result<SubmissionReport, AgentError>;
}

#[async_trait]
pub trait Benchmarker: Send + Sync {
    async fn benchmark(&self, input: &BenchmarkInput) -> Result<SuiteResult, AgentError>;
}

/// One invocation of one agent variant.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentRequest {
    Analyze(AnalyzeInput),
    Code(CodeInput),
    Test(TestInput),
    Debug(DebugInput),
    Optimize(OptimizeInput),
    Submit(SubmitInput),
    Benchmark(BenchmarkInput),
}

impl AgentRequest {
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentRequest::Analyze(_) => AgentKind::Analyzer,
            AgentRequest::Code(_) => AgentKind::Coder,
            AgentRequest::Test(_) => AgentKind::Tester,
            AgentRequest::Debug(_) => AgentKind::Debugger,
            AgentRequest::Optimize(_) => AgentKind::Optimizer,
            AgentRequest::Submit(_) => AgentKind::Submitter,
            AgentRequest::Benchmark(_) => AgentKind::Benchmarker,
        }
    }
}

/// Payload returned by one agent variant.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentResponse {
    Analysis(Analysis),
    Code(String),
    TestReport(TestReport),
    Debug(DebugFeedback),
    Optimization(OptimizationFeedback),
    Submission(SubmissionReport),
    Benchmark(SuiteResult),
}

fn mismatch(expected: &str, got: &AgentResponse) -> AgentError {
    AgentError::InvalidOutput(format!("expected {expected} payload, got {got:?}"))
}

impl AgentResponse {
    pub fn into_analysis(self) -> Result<Analysis, AgentError> {
        match self {
            AgentResponse::Analysis(analysis) => Ok(analysis),
            other => Err(mismatch("analysis", &other)),
        }
    }

    pub fn into_code(self) -> Result<String, AgentError> {
        match self {
            AgentResponse::Code(code) => Ok(code),
            other => Err(mismatch("code", &other)),
        }
    }

    pub fn into_test_report(self) -> Result<TestReport, AgentError> {
        match self {
            AgentResponse::TestReport(report) => Ok(report),
            other => Err(mismatch("test report", &other)),
        }
    }

    pub fn into_debug(self) -> Result<DebugFeedback, AgentError> {
        match self {
            AgentResponse::Debug(feedback) => Ok(feedback),
            other => Err(mismatch("debug feedback", &other)),
        }
    }

    pub fn into_optimization(self) -> Result<OptimizationFeedback, AgentError> {
        match self {
            AgentResponse::Optimization(feedback) => Ok(feedback),
            other => Err(mismatch("optimization feedback", &other)),
        }
    }

    pub fn into_submission(self) -> Result<SubmissionReport, AgentError> {
        match self {
            AgentResponse::Submission(report) => Ok(report),
            other => Err(mismatch("submission report", &other)),
        }
    }

    pub fn into_suite(self) -> Result<SuiteResult, AgentError> {
        match self {
            AgentResponse::Benchmark(suite) => Ok(suite),
            other => Err(mismatch("suite result", &other)),
        }
    }
}

/// Backend, prompt builder and request settings shared by the language-model agents.
#[derive(Clone)]
pub struct LlmContext {
    pub backend: Arc<dyn Backend>,
    pub prompts: Arc<PromptBuilder>,
    pub completion: CompletionConfig,
}

impl LlmContext {
    /// Send a rendered prompt. Template errors surface as `InvalidOutput`.
    pub(crate) async fn complete(
        &self,
        agent: AgentKind,
        prompt: Result<String, minijinja::Error>,
    ) -> Result<String, AgentError> {
        let prompt =
            prompt.map_err(|err| AgentError::InvalidOutput(format!("render {agent} prompt: {err}")))?;
        debug!(agent = %agent, prompt_bytes = prompt.len(), "sending prompt");
        let text = self.backend.complete(&prompt, &self.completion).await?;
        debug!(agent = %agent, response_bytes = text.len(), "received response");
        Ok(text)
    }
}

/// The full capability set used by one orchestrator.
#[derive(Clone)]
pub struct AgentSet {
    pub analyzer: Arc<dyn Analyzer>,
    pub coder: Arc<dyn Coder>,
    pub tester: Arc<dyn Tester>,
    pub debugger: Arc<dyn Debugger>,
    pub optimizer: Arc<dyn Optimizer>,
    pub submitter: Arc<dyn Submitter>,
    pub benchmarker: Arc<dyn Benchmarker>,
}

impl AgentSet {
    /// Default agents over the configured collaborators.
    ///
    /// Every language-model agent shares one throttled backend, so the
    /// requests-per-minute ceiling holds across variants.
    pub fn from_config(cfg: &WeaverConfig, problem_id: &str) -> Self {
        let limiter = Arc::new(RateLimiter::per_minute(cfg.backend.requests_per_minute));
        let backend: Arc<dyn Backend> = Arc::new(ThrottledBackend::new(
            Arc::new(CommandBackend::new(cfg.backend.command.clone())),
            limiter,
        ));
        let llm = LlmContext {
            backend,
            prompts: Arc::new(PromptBuilder::new(cfg.backend.prompt_budget_bytes)),
            completion: CompletionConfig {
                model: cfg.backend.model.clone(),
                timeout: cfg.run.per_call_timeout(),
                output_limit_bytes: cfg.backend.output_limit_bytes,
            },
        };
        let sandbox = ProcessSandbox::new(
            cfg.sandbox.command.clone(),
            cfg.sandbox.entry_point.clone(),
            Duration::from_secs(cfg.sandbox.timeout_secs),
            cfg.sandbox.output_limit_bytes,
        );
        let generator = cfg.sandbox.generate_cases.then(|| llm.clone());
        let judge = CommandJudge::new(
            cfg.judge.command.clone(),
            problem_id.to_string(),
            cfg.run.per_call_timeout(),
            cfg.backend.output_limit_bytes,
        );
        let harness = CommandHarness::new(
            cfg.benchmark.command.clone(),
            cfg.run.per_call_timeout(),
            cfg.backend.output_limit_bytes,
        );
        Self {
            analyzer: Arc::new(LlmAnalyzer::new(llm.clone())),
            coder: Arc::new(LlmCoder::new(llm.clone())),
            tester: Arc::new(CaseTester::new(Arc::new(sandbox), generator)),
            debugger: Arc::new(LlmDebugger::new(llm.clone())),
            optimizer: Arc::new(LlmOptimizer::new(llm)),
            submitter: Arc::new(JudgeSubmitter::new(Arc::new(judge))),
            benchmarker: Arc::new(HarnessBenchmarker::new(
                Arc::new(harness),
                cfg.benchmark.pass_metric.clone(),
                cfg.benchmark.pass_threshold,
            )),
        }
    }

    /// Route a request to its variant.
    pub async fn dispatch(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        match request {
            AgentRequest::Analyze(input) => {
                self.analyzer.analyze(input).await.map(AgentResponse::Analysis)
            }
            AgentRequest::Code(input) => self.coder.code(input).await.map(AgentResponse::Code),
            AgentRequest::Test(input) => {
                self.tester.test(input).await.map(AgentResponse::TestReport)
            }
            AgentRequest::Debug(input) => {
                self.debugger.debug(input).await.map(AgentResponse::Debug)
            }
            AgentRequest::Optimize(input) => self
                .optimizer
                .optimize(input)
                .await
                .map(AgentResponse::Optimization),
            AgentRequest::Submit(input) => self
                .submitter
                .submit(input)
                .await
                .map(AgentResponse::Submission),
            AgentRequest::Benchmark(input) => self
                .benchmarker
                .benchmark(input)
                .await
                .map(AgentResponse::Benchmark),
        }
    }
}
