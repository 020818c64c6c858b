//! Tester: gathers cases for a problem and runs candidate code against them.
//!
//! Cases come from the `Input:`/`Output:` examples in the problem description,
//! plus backend-generated cases when enabled. Cases are gathered once per
//! tester and reused for every later run, so successive reports compare the
//! same inputs.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use jsonschema::Validator;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::core::errors::AgentError;
use crate::core::types::{AgentKind, TestCase, TestReport};
use crate::io::sandbox::CodeRunner;

use super::parse::{compile_schema, extract_examples, parse_json_payload};
use super::{LlmContext, TestInput, Tester};

const GENERATED_CASES_SCHEMA: &str = include_str!("../../schemas/generated_cases.schema.json");

static SCHEMA: LazyLock<Validator> = LazyLock::new(|| compile_schema(GENERATED_CASES_SCHEMA));

#[derive(Debug, Deserialize)]
struct GeneratedCases {
    cases: Vec<Value>,
}

pub struct CaseTester {
    runner: Arc<dyn CodeRunner>,
    /// Present when extra cases should be generated.
    generator: Option<LlmContext>,
    cases: OnceCell<Vec<TestCase>>,
}

impl CaseTester {
    pub fn new(runner: Arc<dyn CodeRunner>, generator: Option<LlmContext>) -> Self {
        Self {
            runner,
            generator,
            cases: OnceCell::new(),
        }
    }

    async fn gather(&self, input: &TestInput) -> Vec<TestCase> {
        let mut cases = extract_examples(&input.problem.description);
        info!(examples = cases.len(), "extracted examples");
        if let Some(llm) = &self.generator {
            match generate(llm, input).await {
                Ok(generated) => {
                    info!(generated = generated.len(), "generated extra cases");
                    cases.extend(generated);
                }
                Err(err) => warn!(err = %err, "case generation failed, using examples only"),
            }
        }
        cases
    }
}

async fn generate(llm: &LlmContext, input: &TestInput) -> Result<Vec<TestCase>, AgentError> {
    let prompt = llm.prompts.tester(&input.problem, &input.constraints);
    let text = llm.complete(AgentKind::Tester, prompt).await?;
    let payload: GeneratedCases = parse_json_payload(&text, &SCHEMA)?;
    Ok(to_cases(payload.cases))
}

/// Keep cases with an argument list and an expected value. Malformed entries are dropped.
fn to_cases(raw: Vec<Value>) -> Vec<TestCase> {
    let total = raw.len();
    let cases: Vec<TestCase> = raw
        .into_iter()
        .filter_map(|mut case| {
            let input = case.get_mut("input")?.take();
            let expected = case.get_mut("expected")?.take();
            match input {
                Value::Array(args) => Some((args, expected)),
                _ => None,
            }
        })
        .enumerate()
        .map(|(index, (input, expected))| TestCase {
            id: format!("generated_{}", index + 1),
            input,
            expected,
        })
        .collect();
    if cases.len() < total {
        warn!(
            dropped = total - cases.len(),
            "dropped malformed generated cases"
        );
    }
    cases
}

#[async_trait]
impl Tester for CaseTester {
    #[instrument(skip_all, fields(problem = %input.problem.id))]
    async fn test(&self, input: &TestInput) -> Result<TestReport, AgentError> {
        let cases = self.cases.get_or_init(|| self.gather(input)).await;
        let report = self.runner.run(&input.code, cases).await?;
        Ok(report)
    }
}
