//! The control loop.
//!
//! [`Orchestrator::run`] owns one [`WorkflowState`] per problem and drives it
//! through `Init → Planning → Coding → Testing → {Debugging | Optimizing |
//! Submitting} → Terminal`. Next-phase decisions come from the pure functions
//! in [`crate::core::transitions`]; this module only invokes agents, applies
//! their payloads and records the edge taken.
//!
//! Exactly one agent call is outstanding at a time. Every call goes through
//! [`Run::invoke`], which applies the per-call timeout, the transient retry
//! policy and cancellation. Cancellation and the run deadline are checked at
//! every phase boundary as well.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::agents::{
    AgentRequest, AgentResponse, AgentSet, AnalyzeInput, BenchmarkInput, CodeInput, DebugInput,
    OptimizeInput, SubmitInput, TestInput,
};
use crate::core::budget::{call_budget, deadline_after, remaining_budget, saturating_millis};
use crate::core::errors::{AgentError, WorkflowError};
use crate::core::invariants::validate_state;
use crate::core::outcome::{ExternalChecks, RunReport, classify_submission};
use crate::core::state::WorkflowState;
use crate::core::transitions::{
    AfterDebugging, AfterOptimizing, AfterTesting, LoopLimits, TestingFacts, after_debugging,
    after_optimizing, after_testing, same_code,
};
use crate::core::types::{
    BenchmarkReport, Feedback, Phase, ProblemInput, RejectedPlan, RunStatus, SuiteResult,
};
use crate::io::config::RunConfig;

/// Runs problems to a terminal state with a fixed agent set and configuration.
pub struct Orchestrator {
    agents: AgentSet,
    config: RunConfig,
    benchmark_suites: Vec<String>,
}

impl Orchestrator {
    pub fn new(agents: AgentSet, config: RunConfig) -> Self {
        Self {
            agents,
            config,
            benchmark_suites: Vec::new(),
        }
    }

    /// Suites handed to the benchmarker when benchmarking is enabled.
    pub fn with_benchmark_suites(mut self, suites: Vec<String>) -> Self {
        self.benchmark_suites = suites;
        self
    }

    /// Run one problem to completion. Never fails: every outcome, including
    /// collaborator failures and cancellation, is part of the returned report.
    #[instrument(skip_all, fields(problem = %problem.id))]
    pub async fn run(&self, problem: ProblemInput, cancel: &CancellationToken) -> RunReport {
        let started = Instant::now();
        let mut run = Run {
            agents: &self.agents,
            config: &self.config,
            suites: &self.benchmark_suites,
            limits: self.config.limits(),
            checks: self.config.external_checks(),
            cancel,
            deadline: deadline_after(started, self.config.run_timeout()),
            state: WorkflowState::new(problem),
        };
        run.drive().await;

        let violations = validate_state(&run.state, &run.limits);
        if !violations.is_empty() {
            warn!(?violations, "workflow state invariants violated");
        }
        let duration_ms = saturating_millis(started.elapsed());
        let report = RunReport::from_state(&run.state, duration_ms);
        info!(
            status = %report.status,
            debug_iterations = report.iteration_counts.debug,
            optimize_iterations = report.iteration_counts.optimize,
            replans = report.iteration_counts.replans,
            duration_ms,
            "run finished"
        );
        report
    }
}

/// State and borrowed settings for one run.
struct Run<'a> {
    agents: &'a AgentSet,
    config: &'a RunConfig,
    suites: &'a [String],
    limits: LoopLimits,
    checks: ExternalChecks,
    cancel: &'a CancellationToken,
    deadline: Instant,
    state: WorkflowState,
}

type Accept<T> = fn(AgentResponse) -> Result<T, AgentError>;

fn accept_code(response: AgentResponse) -> Result<String, AgentError> {
    let code = response.into_code()?;
    if code.trim().is_empty() {
        return Err(AgentError::InvalidOutput("coder returned empty code".to_string()));
    }
    Ok(code)
}

impl Run<'_> {
    async fn drive(&mut self) {
        while !self.state.phase().is_terminal() {
            let step = match self.boundary() {
                Err(err) => Err(err),
                Ok(()) => match self.state.phase() {
                    Phase::Init => self.state.transition(Phase::Planning, "run started"),
                    Phase::Planning => self.plan().await,
                    Phase::Coding => self.code().await,
                    Phase::Testing => self.test().await,
                    Phase::Debugging => self.debug().await,
                    Phase::Optimizing => self.optimize().await,
                    Phase::Submitting => self.submit().await,
                    Phase::Terminal => Ok(()),
                },
            };
            if let Err(err) = step {
                self.stop(err);
            }
        }
    }

    fn boundary(&self) -> Result<(), WorkflowError> {
        if self.cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }
        if remaining_budget(self.deadline).is_none() {
            return Err(self.run_time_exceeded());
        }
        Ok(())
    }

    fn run_time_exceeded(&self) -> WorkflowError {
        WorkflowError::bound("run time", self.config.run_timeout_secs)
    }

    /// End the run on a control-loop error. The state downgrades to `Failed`
    /// when no code was ever produced.
    fn stop(&mut self, err: WorkflowError) {
        let status = match err {
            WorkflowError::IllegalTransition { .. } => RunStatus::Failed,
            _ => RunStatus::Exhausted,
        };
        warn!(phase = %self.state.phase(), err = %err, "run stopped");
        let reason = err.to_string();
        self.state.finish(status, Some(err), &reason);
    }

    /// One agent call with the per-call timeout and transient retries.
    ///
    /// A result that arrives after cancellation is discarded.
    async fn invoke<T>(
        &self,
        request: &AgentRequest,
        accept: Accept<T>,
    ) -> Result<T, WorkflowError> {
        let kind = request.kind();
        let policy = self.config.retry_policy();
        let mut retry = 0;
        loop {
            let budget = call_budget(self.config.per_call_timeout(), self.deadline)
                .ok_or_else(|| self.run_time_exceeded())?;
            debug!(
                agent = %kind,
                attempt = retry + 1,
                budget_ms = budget.as_millis(),
                "invoking agent"
            );
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(WorkflowError::Cancelled),
                outcome = timeout(budget, self.agents.dispatch(request)) => outcome,
            };
            if self.cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }
            let err = match outcome {
                Ok(response) => match response.and_then(accept) {
                    Ok(value) => return Ok(value),
                    Err(err) => err,
                },
                Err(_) => AgentError::Timeout(format!(
                    "{kind} gave no answer within {}ms",
                    budget.as_millis()
                )),
            };
            if !policy.should_retry(&err, retry) {
                return Err(WorkflowError::collaborator(kind, err));
            }
            let delay = policy.backoff(retry);
            retry += 1;
            warn!(
                agent = %kind,
                attempt = retry,
                delay_ms = delay.as_millis(),
                err = %err,
                "retrying agent call"
            );
            self.pause(delay).await?;
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), WorkflowError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WorkflowError::Cancelled),
            _ = sleep(delay) => Ok(()),
        }
    }

    /// Re-run a whole phase call after a final collaborator failure, up to `max_phase_attempts`.
    async fn invoke_phase<T>(
        &self,
        request: &AgentRequest,
        accept: Accept<T>,
    ) -> Result<T, WorkflowError> {
        let mut attempt = 1;
        loop {
            match self.invoke(request, accept).await {
                Err(WorkflowError::CollaboratorFailure { agent, error })
                    if attempt < self.config.max_phase_attempts =>
                {
                    warn!(agent = %agent, attempt, err = %error, "phase attempt failed");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn current_code(&self) -> Result<String, WorkflowError> {
        self.state
            .code()
            .map(str::to_string)
            .ok_or_else(|| {
                WorkflowError::NoProgress(format!("{} reached without code", self.state.phase()))
            })
    }

    async fn plan(&mut self) -> Result<(), WorkflowError> {
        let request = AgentRequest::Analyze(AnalyzeInput {
            problem: self.state.problem().clone(),
            rejected: self.state.rejected_plan().cloned(),
        });
        let analysis = self
            .invoke_phase(&request, AgentResponse::into_analysis)
            .await?;
        info!(constraints = analysis.constraints.len(), "plan ready");
        self.state.apply_analysis(analysis);
        self.state.transition(Phase::Coding, "plan ready")
    }

    async fn code(&mut self) -> Result<(), WorkflowError> {
        let from_optimization = self
            .state
            .feedback()
            .is_some_and(Feedback::is_optimization);
        let request = AgentRequest::Code(CodeInput {
            problem: self.state.problem().clone(),
            plan: self.state.plan().unwrap_or_default().to_string(),
            constraints: self.state.constraints().to_vec(),
            prior_code: self.state.code().map(str::to_string),
            feedback: self.state.feedback().cloned(),
        });
        let code = match self.invoke_phase(&request, accept_code).await {
            Ok(code) => code,
            Err(err @ WorkflowError::CollaboratorFailure { .. }) if from_optimization => {
                return self.fall_back(&format!("optimized rewrite failed: {err}"));
            }
            Err(err) => return Err(err),
        };

        if from_optimization {
            if self
                .state
                .best_passing_code()
                .is_some_and(|passing| same_code(passing, &code))
            {
                return self.fall_back("optimized rewrite repeats the passing code");
            }
        } else if self
            .state
            .last_failing_code()
            .is_some_and(|failing| same_code(failing, &code))
        {
            return Err(WorkflowError::NoProgress(
                "coder returned the previous failing code unchanged".to_string(),
            ));
        }

        info!(code_bytes = code.len(), from_optimization, "candidate ready");
        self.state.clear_feedback();
        self.state.replace_code(code, from_optimization);
        self.state.transition(Phase::Testing, "candidate ready")
    }

    /// Put the last passing candidate back and move on to submission.
    fn fall_back(&mut self, reason: &str) -> Result<(), WorkflowError> {
        if !self.state.restore_best_passing() {
            return Err(WorkflowError::NoProgress(format!(
                "{reason}; no passing code to restore"
            )));
        }
        warn!(reason, "restored last passing code");
        self.state.note(format!("{reason}; kept the last passing code"));
        self.state.transition(Phase::Submitting, reason)
    }

    async fn test(&mut self) -> Result<(), WorkflowError> {
        let request = AgentRequest::Test(TestInput {
            problem: self.state.problem().clone(),
            constraints: self.state.constraints().to_vec(),
            code: self.current_code()?,
        });
        let report = self
            .invoke(&request, AgentResponse::into_test_report)
            .await?;
        if report.cases.is_empty() {
            self.state
                .note("no test cases were available; the empty report counts as passing");
        }
        info!(
            passed = report.passed_count(),
            failed = report.failed_count(),
            "tests finished"
        );

        let counts = self.state.counts();
        let facts = TestingFacts {
            all_passed: report.all_passed(),
            debug_iterations: counts.debug,
            optimize_iterations: counts.optimize,
            already_optimized: self.state.current_code_optimized(),
            from_optimization: self.state.code_from_optimization(),
            has_passing_fallback: self.state.best_passing_code().is_some(),
        };
        let failed = report.failed_count();
        self.state.record_test_report(report);

        match after_testing(&facts, &self.limits) {
            AfterTesting::Debug => {
                self.state.enter_debugging();
                self.state
                    .transition(Phase::Debugging, &format!("{failed} failing cases"))
            }
            AfterTesting::Optimize => {
                self.state.enter_optimizing();
                self.state.transition(Phase::Optimizing, "all cases passed")
            }
            AfterTesting::Submit => self.state.transition(Phase::Submitting, "all cases passed"),
            AfterTesting::RestorePassing => self.fall_back("optimized rewrite failed its tests"),
            AfterTesting::DebugBoundReached => Err(WorkflowError::bound(
                "debug iterations",
                u64::from(self.limits.max_debug_iterations),
            )),
        }
    }

    async fn debug(&mut self) -> Result<(), WorkflowError> {
        let plan = self.state.plan().unwrap_or_default().to_string();
        let request = AgentRequest::Debug(DebugInput {
            problem: self.state.problem().clone(),
            plan: plan.clone(),
            code: self.current_code()?,
            report: self.state.test_report().cloned().unwrap_or_default(),
        });
        let feedback = self.invoke(&request, AgentResponse::into_debug).await?;
        let replans = self.state.counts().replans;
        match after_debugging(&feedback, replans, &self.limits) {
            AfterDebugging::Replan => {
                info!(replans = replans + 1, "debugger rejected the plan");
                self.state.request_replan(RejectedPlan {
                    plan,
                    diagnosis: feedback.diagnosis.clone(),
                });
                self.state.set_feedback(Feedback::Debug(feedback));
                self.state
                    .transition(Phase::Planning, "debugger rejected the plan")
            }
            AfterDebugging::Code => {
                if feedback.replan {
                    info!(replans, "replan allowance used; treating as a code fix");
                }
                self.state.set_feedback(Feedback::Debug(feedback));
                self.state.transition(Phase::Coding, "debug feedback ready")
            }
        }
    }

    async fn optimize(&mut self) -> Result<(), WorkflowError> {
        let code = self.current_code()?;
        let request = AgentRequest::Optimize(OptimizeInput {
            problem: self.state.problem().clone(),
            constraints: self.state.constraints().to_vec(),
            code: code.clone(),
        });
        let feedback = match self.invoke(&request, AgentResponse::into_optimization).await {
            Ok(feedback) => feedback,
            Err(err @ WorkflowError::CollaboratorFailure { .. }) => {
                warn!(err = %err, "optimizer failed, submitting the passing code");
                self.state.note(format!("optimization skipped: {err}"));
                return self.state.transition(Phase::Submitting, "optimizer failed");
            }
            Err(err) => return Err(err),
        };
        match after_optimizing(&feedback, &code) {
            AfterOptimizing::Code => {
                self.state.set_feedback(Feedback::Optimization(feedback));
                self.state
                    .transition(Phase::Coding, "optimizer proposed a revision")
            }
            AfterOptimizing::Submit => self
                .state
                .transition(Phase::Submitting, "optimizer proposed no change"),
        }
    }

    async fn submit(&mut self) -> Result<(), WorkflowError> {
        let code = self.current_code()?;
        if self.checks.submission {
            let request = AgentRequest::Submit(SubmitInput { code: code.clone() });
            match self.invoke(&request, AgentResponse::into_submission).await {
                Ok(report) => {
                    info!(accepted = report.accepted, "submission judged");
                    if !report.accepted {
                        let detail = report.error_message.as_deref().unwrap_or("no details");
                        self.state.note(format!("judge rejected the submission: {detail}"));
                    }
                    self.state.record_submission(report);
                }
                Err(err @ WorkflowError::CollaboratorFailure { .. }) => {
                    warn!(err = %err, "submission failed");
                    self.state.note(format!("submission failed: {err}"));
                }
                Err(err) => return Err(err),
            }
        }
        if self.checks.benchmark {
            let mut suites = Vec::with_capacity(self.suites.len());
            for suite_id in self.suites {
                let request = AgentRequest::Benchmark(BenchmarkInput {
                    code: code.clone(),
                    suite_id: suite_id.clone(),
                });
                match self.invoke(&request, AgentResponse::into_suite).await {
                    Ok(suite) => suites.push(suite),
                    Err(err @ WorkflowError::CollaboratorFailure { .. }) => {
                        warn!(suite = %suite_id, err = %err, "benchmark suite failed");
                        self.state
                            .note(format!("benchmark suite {suite_id} failed: {err}"));
                        suites.push(SuiteResult {
                            suite_id: suite_id.clone(),
                            metrics: BTreeMap::new(),
                            passed: false,
                        });
                    }
                    Err(err) => return Err(err),
                }
            }
            let report = BenchmarkReport { suites };
            info!(
                accepted = report.accepted(),
                suites = report.suites.len(),
                "benchmarks finished"
            );
            self.state.record_benchmark(report);
        }
        let status =
            classify_submission(self.checks, self.state.submission(), self.state.benchmark());
        self.state.finish(status, None, "external checks finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::OptimizationFeedback;
    use crate::test_support::{
        Scripted, ScriptedAgents, Step, analysis, debug_feedback, failing_report, passing_report,
        problem, run_config,
    };

    #[tokio::test(start_paused = true)]
    async fn hung_agent_is_retried_after_call_timeout() {
        let agents = ScriptedAgents {
            analyzer: Scripted::steps(vec![
                Step::ok(analysis()).after(Duration::from_secs(3600)),
                Step::ok(analysis()),
            ]),
            coder: Scripted::new(vec![Ok("print(1)".to_string())]),
            tester: Scripted::new(vec![Ok(passing_report(2))]),
            ..ScriptedAgents::default()
        };
        let orchestrator = Orchestrator::new(agents.agent_set(), run_config());
        let report = orchestrator.run(problem(), &CancellationToken::new()).await;
        assert_eq!(report.status, RunStatus::SolvedUnoptimized);
        assert_eq!(agents.analyzer.call_count(), 2);
        assert_eq!(report.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn run_deadline_ends_a_slow_run() {
        let mut config = run_config();
        config.run_timeout_secs = 60;
        config.per_call_timeout_secs = 45;
        let agents = ScriptedAgents {
            analyzer: Scripted::new(vec![Ok(analysis())]),
            coder: Scripted::steps(vec![
                Step::ok("print(1)".to_string()).after(Duration::from_secs(40)),
            ]),
            tester: Scripted::steps(vec![
                Step::ok(passing_report(1)).after(Duration::from_secs(40)),
            ]),
            ..ScriptedAgents::default()
        };
        let report = Orchestrator::new(agents.agent_set(), config)
            .run(problem(), &CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::Exhausted);
        assert_eq!(report.error, Some(WorkflowError::bound("run time", 60)));
        assert_eq!(report.final_code.as_deref(), Some("print(1)"));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_run_timeout_still_reports() {
        let mut config = run_config();
        config.run_timeout_secs = u64::MAX;
        let agents = ScriptedAgents {
            analyzer: Scripted::new(vec![Ok(analysis())]),
            coder: Scripted::new(vec![Ok("print(1)".to_string())]),
            tester: Scripted::new(vec![Ok(passing_report(2))]),
            ..ScriptedAgents::default()
        };
        let report = Orchestrator::new(agents.agent_set(), config)
            .run(problem(), &CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::SolvedUnoptimized);
        assert_eq!(report.error, None);
    }

    #[tokio::test]
    async fn invalid_output_uses_phase_attempts_not_retries() {
        let agents = ScriptedAgents {
            analyzer: Scripted::new(vec![
                Err(AgentError::InvalidOutput("not json".to_string())),
                Err(AgentError::InvalidOutput("still not json".to_string())),
            ]),
            ..ScriptedAgents::default()
        };
        let report = Orchestrator::new(agents.agent_set(), run_config())
            .run(problem(), &CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(agents.analyzer.call_count(), 2);
        assert!(matches!(
            report.error,
            Some(WorkflowError::CollaboratorFailure { .. })
        ));
        assert_eq!(report.final_code, None);
    }

    #[tokio::test]
    async fn empty_code_is_rejected() {
        let agents = ScriptedAgents {
            analyzer: Scripted::new(vec![Ok(analysis())]),
            coder: Scripted::new(vec![Ok("   ".to_string()), Ok("\n".to_string())]),
            ..ScriptedAgents::default()
        };
        let report = Orchestrator::new(agents.agent_set(), run_config())
            .run(problem(), &CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(agents.tester.call_count(), 0);
    }

    #[tokio::test]
    async fn tester_failure_keeps_the_code() {
        let agents = ScriptedAgents {
            analyzer: Scripted::new(vec![Ok(analysis())]),
            coder: Scripted::new(vec![Ok("print(1)".to_string())]),
            tester: Scripted::new(vec![Err(AgentError::InvalidOutput(
                "harness crashed".to_string(),
            ))]),
            ..ScriptedAgents::default()
        };
        let report = Orchestrator::new(agents.agent_set(), run_config())
            .run(problem(), &CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::Exhausted);
        assert_eq!(report.final_code.as_deref(), Some("print(1)"));
    }

    #[tokio::test]
    async fn optimizer_failure_is_advisory() {
        let mut config = run_config();
        config.optimization_enabled = true;
        let agents = ScriptedAgents {
            analyzer: Scripted::new(vec![Ok(analysis())]),
            coder: Scripted::new(vec![Ok("print(1)".to_string())]),
            tester: Scripted::new(vec![Ok(passing_report(2))]),
            optimizer: Scripted::new(vec![Err(AgentError::InvalidOutput(
                "no json".to_string(),
            ))]),
            ..ScriptedAgents::default()
        };
        let report = Orchestrator::new(agents.agent_set(), config)
            .run(problem(), &CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::SolvedUnoptimized);
        assert_eq!(report.iteration_counts.optimize, 1);
        assert!(report.notes.iter().any(|note| note.contains("optimization skipped")));
    }

    #[tokio::test]
    async fn second_optimization_round_respects_the_bound() {
        let mut config = run_config();
        config.optimization_enabled = true;
        config.max_optimize_iterations = 2;
        let revise = |code: &str| OptimizationFeedback {
            analysis: "faster".to_string(),
            revised_code: Some(code.to_string()),
        };
        let agents = ScriptedAgents {
            analyzer: Scripted::new(vec![Ok(analysis())]),
            coder: Scripted::new(vec![
                Ok("v1".to_string()),
                Ok("v2".to_string()),
                Ok("v3".to_string()),
            ]),
            tester: Scripted::new(vec![
                Ok(passing_report(1)),
                Ok(passing_report(1)),
                Ok(passing_report(1)),
            ]),
            optimizer: Scripted::new(vec![Ok(revise("v2")), Ok(revise("v3"))]),
            ..ScriptedAgents::default()
        };
        let report = Orchestrator::new(agents.agent_set(), config)
            .run(problem(), &CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::SolvedUnoptimized);
        assert_eq!(report.iteration_counts.optimize, 2);
        assert_eq!(report.final_code.as_deref(), Some("v3"));
        assert_eq!(agents.optimizer.call_count(), 2);
    }

    #[tokio::test]
    async fn transitions_follow_the_recorded_path() {
        let agents = ScriptedAgents {
            analyzer: Scripted::new(vec![Ok(analysis())]),
            coder: Scripted::new(vec![Ok("v1".to_string()), Ok("v2".to_string())]),
            tester: Scripted::new(vec![
                Ok(failing_report(&["example_1"], 2)),
                Ok(passing_report(2)),
            ]),
            debugger: Scripted::new(vec![Ok(debug_feedback("swap the indices"))]),
            ..ScriptedAgents::default()
        };
        let report = Orchestrator::new(agents.agent_set(), run_config())
            .run(problem(), &CancellationToken::new())
            .await;
        let path: Vec<Phase> = report.transitions.iter().map(|record| record.to).collect();
        assert_eq!(
            path,
            vec![
                Phase::Planning,
                Phase::Coding,
                Phase::Testing,
                Phase::Debugging,
                Phase::Coding,
                Phase::Testing,
                Phase::Submitting,
                Phase::Terminal,
            ]
        );
    }
}
