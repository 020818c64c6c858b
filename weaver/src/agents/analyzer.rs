//! Analyzer backed by the language model.

use std::sync::LazyLock;

use async_trait::async_trait;
use jsonschema::Validator;
use tracing::instrument;

use crate::core::errors::AgentError;
use crate::core::types::{AgentKind, Analysis};

use super::parse::{compile_schema, parse_json_payload};
use super::{AnalyzeInput, Analyzer, LlmContext};

const ANALYSIS_SCHEMA: &str = include_str!("../../schemas/analysis.schema.json");

static SCHEMA: LazyLock<Validator> = LazyLock::new(|| compile_schema(ANALYSIS_SCHEMA));

pub struct LlmAnalyzer {
    llm: LlmContext,
}

impl LlmAnalyzer {
    pub fn new(llm: LlmContext) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    #[instrument(skip_all, fields(problem = %input.problem.id, replan = input.rejected.is_some()))]
    async fn analyze(&self, input: &AnalyzeInput) -> Result<Analysis, AgentError> {
        let prompt = self
            .llm
            .prompts
            .analyzer(&input.problem, input.rejected.as_ref());
        let text = self.llm.complete(AgentKind::Analyzer, prompt).await?;
        let mut analysis: Analysis = parse_json_payload(&text, &SCHEMA)?;
        analysis.plan = analysis.plan.trim().to_string();
        if analysis.plan.is_empty() {
            return Err(AgentError::InvalidOutput("analysis plan is blank".to_string()));
        }
        analysis
            .constraints
            .retain(|constraint| !constraint.trim().is_empty());
        Ok(analysis)
    }
}
