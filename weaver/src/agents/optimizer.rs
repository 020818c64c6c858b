//! Optimizer backed by the language model. Advisory only.

use std::sync::LazyLock;

use async_trait::async_trait;
use jsonschema::Validator;
use tracing::instrument;

use crate::core::errors::AgentError;
use crate::core::types::{AgentKind, OptimizationFeedback};

use super::parse::{compile_schema, extract_code_block, parse_json_payload};
use super::{LlmContext, OptimizeInput, Optimizer};

const OPTIMIZATION_SCHEMA: &str = include_str!("../../schemas/optimization_feedback.schema.json");

static SCHEMA: LazyLock<Validator> = LazyLock::new(|| compile_schema(OPTIMIZATION_SCHEMA));

pub struct LlmOptimizer {
    llm: LlmContext,
}

impl LlmOptimizer {
    pub fn new(llm: LlmContext) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Optimizer for LlmOptimizer {
    #[instrument(skip_all, fields(code_bytes = input.code.len()))]
    async fn optimize(&self, input: &OptimizeInput) -> Result<OptimizationFeedback, AgentError> {
        let prompt = self
            .llm
            .prompts
            .optimizer(&input.problem, &input.constraints, &input.code);
        let text = self.llm.complete(AgentKind::Optimizer, prompt).await?;
        let mut feedback: OptimizationFeedback = parse_json_payload(&text, &SCHEMA)?;
        // Revised code may arrive fenced inside the JSON string.
        feedback.revised_code = feedback
            .revised_code
            .map(|code| extract_code_block(&code).unwrap_or_else(|_| code.trim().to_string()))
            .filter(|code| !code.is_empty());
        Ok(feedback)
    }
}
