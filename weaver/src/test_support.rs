//! Test doubles for agents and the language-model backend.
//!
//! Scripted doubles replay queued outcomes in order and record every input
//! they receive, so tests can assert both on the run and on what each agent saw.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::agents::{
    AgentSet, AnalyzeInput, Analyzer, BenchmarkInput, Benchmarker, CodeInput, Coder, DebugInput,
    Debugger, LlmContext, OptimizeInput, Optimizer, SubmitInput, Submitter, TestInput, Tester,
};
use crate::core::errors::AgentError;
use crate::core::types::{
    Analysis, CaseResult, DebugFeedback, OptimizationFeedback, ProblemInput, SubmissionReport,
    SuiteResult, TestReport,
};
use crate::io::backend::{Backend, CollaboratorError, CompletionConfig};
use crate::io::config::RunConfig;
use crate::io::prompt::PromptBuilder;

/// One queued outcome, returned after an optional delay.
#[derive(Debug, Clone)]
pub struct Step<O> {
    pub delay: Duration,
    pub outcome: Result<O, AgentError>,
}

impl<O> Step<O> {
    pub fn ok(value: O) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(value),
        }
    }

    pub fn err(error: AgentError) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(error),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Agent double for any variant. An exhausted script answers `InvalidOutput`.
pub struct Scripted<I, O> {
    steps: Mutex<VecDeque<Step<O>>>,
    calls: Mutex<Vec<I>>,
}

impl<I: Clone + Send, O: Send> Scripted<I, O> {
    pub fn new(outcomes: Vec<Result<O, AgentError>>) -> Arc<Self> {
        Self::steps(
            outcomes
                .into_iter()
                .map(|outcome| Step {
                    delay: Duration::ZERO,
                    outcome,
                })
                .collect(),
        )
    }

    pub fn steps(steps: Vec<Step<O>>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Inputs received so far, in call order.
    pub fn calls(&self) -> Vec<I> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    async fn next(&self, input: &I) -> Result<O, AgentError> {
        self.calls.lock().expect("calls lock").push(input.clone());
        let step = self.steps.lock().expect("steps lock").pop_front();
        let Some(step) = step else {
            return Err(AgentError::InvalidOutput("script exhausted".to_string()));
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.outcome
    }
}

#[async_trait]
impl Analyzer for Scripted<AnalyzeInput, Analysis> {
    async fn analyze(&self, input: &AnalyzeInput) -> Result<Analysis, AgentError> {
        self.next(input).await
    }
}

#[async_trait]
impl Coder for Scripted<CodeInput, String> {
    async fn code(&self, input: &CodeInput) -> Result<String, AgentError> {
        self.next(input).await
    }
}

#[async_trait]
impl Tester for Scripted<TestInput, TestReport> {
    async fn test(&self, input: &TestInput) -> Result<TestReport, AgentError> {
        self.next(input).await
    }
}

#[async_trait]
impl Debugger for Scripted<DebugInput, DebugFeedback> {
    async fn debug(&self, input: &DebugInput) -> Result<DebugFeedback, AgentError> {
        self.next(input).await
    }
}

#[async_trait]
impl Optimizer for Scripted<OptimizeInput, OptimizationFeedback> {
    async fn optimize(&self, input: &OptimizeInput) -> Result<OptimizationFeedback, AgentError> {
        self.next(input).await
    }
}

#[async_trait]
impl Submitter for Scripted<SubmitInput, SubmissionReport> {
    async fn submit(&self, input: &SubmitInput) -> Result<SubmissionReport, AgentError> {
        self.next(input).await
    }
}

#[async_trait]
impl Benchmarker for Scripted<BenchmarkInput, SuiteResult> {
    async fn benchmark(&self, input: &BenchmarkInput) -> Result<SuiteResult, AgentError> {
        self.next(input).await
    }
}

/// One scripted double per variant, all empty until a test fills them.
pub struct ScriptedAgents {
    pub analyzer: Arc<Scripted<AnalyzeInput, Analysis>>,
    pub coder: Arc<Scripted<CodeInput, String>>,
    pub tester: Arc<Scripted<TestInput, TestReport>>,
    pub debugger: Arc<Scripted<DebugInput, DebugFeedback>>,
    pub optimizer: Arc<Scripted<OptimizeInput, OptimizationFeedback>>,
    pub submitter: Arc<Scripted<SubmitInput, SubmissionReport>>,
    pub benchmarker: Arc<Scripted<BenchmarkInput, SuiteResult>>,
}

impl Default for ScriptedAgents {
    fn default() -> Self {
        Self {
            analyzer: Scripted::new(Vec::new()),
            coder: Scripted::new(Vec::new()),
            tester: Scripted::new(Vec::new()),
            debugger: Scripted::new(Vec::new()),
            optimizer: Scripted::new(Vec::new()),
            submitter: Scripted::new(Vec::new()),
            benchmarker: Scripted::new(Vec::new()),
        }
    }
}

impl ScriptedAgents {
    pub fn agent_set(&self) -> AgentSet {
        AgentSet {
            analyzer: self.analyzer.clone(),
            coder: self.coder.clone(),
            tester: self.tester.clone(),
            debugger: self.debugger.clone(),
            optimizer: self.optimizer.clone(),
            submitter: self.submitter.clone(),
            benchmarker: self.benchmarker.clone(),
        }
    }
}

/// Backend double that replays completions and records prompts.
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Result<String, CollaboratorError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Answers every prompt with the same text.
    pub fn repeating(text: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn complete(
        &self,
        prompt: &str,
        _config: &CompletionConfig,
    ) -> Result<String, CollaboratorError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        let next = self.responses.lock().expect("responses lock").pop_front();
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(text)) => Ok(text.clone()),
            (None, None) => Err(CollaboratorError::Invalid(
                "no scripted completion left".to_string(),
            )),
        }
    }
}

pub fn llm_context(backend: Arc<ScriptedBackend>) -> LlmContext {
    LlmContext {
        backend,
        prompts: Arc::new(PromptBuilder::new(48_000)),
        completion: CompletionConfig {
            model: "scripted".to_string(),
            timeout: Duration::from_secs(30),
            output_limit_bytes: 1 << 20,
        },
    }
}

pub fn problem() -> ProblemInput {
    ProblemInput {
        id: "two-sum".to_string(),
        title: "Two Sum".to_string(),
        description: "Given nums and target, return indices of the two numbers adding up to target.\n\n\
             Example 1:\nInput: nums = [2,7,11,15], target = 9\nOutput: [0,1]\n\n\
             Example 2:\nInput: nums = [3,2,4], target = 6\nOutput: [1,2]\n"
            .to_string(),
        starting_code: Some(
            "class Solution:\n    def twoSum(self, nums: List[int], target: int) -> List[int]:\n"
                .to_string(),
        ),
    }
}

pub fn analysis() -> Analysis {
    Analysis {
        constraints: vec!["2 <= nums.length <= 10^4".to_string()],
        plan: "Single pass with a hash map from value to index.".to_string(),
    }
}

fn passing_case(index: usize) -> CaseResult {
    CaseResult {
        id: format!("example_{index}"),
        passed: true,
        input: vec![json!([2, 7, 11, 15]), json!(9)],
        expected: json!([0, 1]),
        actual: Some(json!([0, 1])),
        stdout: String::new(),
        error: None,
        time_ms: Some(0.2),
        memory_kb: Some(64),
    }
}

/// `total` cases named `example_1..=total`, all passing.
pub fn passing_report(total: usize) -> TestReport {
    TestReport {
        cases: (1..=total).map(passing_case).collect(),
    }
}

/// `total` cases where the listed ids fail.
pub fn failing_report(failing: &[&str], total: usize) -> TestReport {
    let mut report = passing_report(total);
    for result in &mut report.cases {
        if failing.contains(&result.id.as_str()) {
            result.passed = false;
            result.actual = Some(json!([1, 0]));
        }
    }
    report
}

pub fn debug_feedback(fix: &str) -> DebugFeedback {
    DebugFeedback {
        diagnosis: "returns indices in the wrong order".to_string(),
        suggested_fix: fix.to_string(),
        replan: false,
    }
}

/// Run bounds small enough for scripted runs, with no external checks.
pub fn run_config() -> RunConfig {
    RunConfig {
        max_debug_iterations: 3,
        max_optimize_iterations: 1,
        optimization_enabled: false,
        submission_enabled: false,
        benchmark_enabled: false,
        per_call_timeout_secs: 30,
        run_timeout_secs: 600,
        transient_retries: 3,
        retry_backoff_ms: 100,
        max_phase_attempts: 2,
        max_replans: 1,
    }
}
