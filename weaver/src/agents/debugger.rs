//! Debugger backed by the language model.

use std::sync::LazyLock;

use async_trait::async_trait;
use jsonschema::Validator;
use tracing::instrument;

use crate::core::errors::AgentError;
use crate::core::types::{AgentKind, DebugFeedback};

use super::parse::{compile_schema, parse_json_payload};
use super::{DebugInput, Debugger, LlmContext};

const DEBUG_FEEDBACK_SCHEMA: &str = include_str!("../../schemas/debug_feedback.schema.json");

static SCHEMA: LazyLock<Validator> = LazyLock::new(|| compile_schema(DEBUG_FEEDBACK_SCHEMA));

pub struct LlmDebugger {
    llm: LlmContext,
}

impl LlmDebugger {
    pub fn new(llm: LlmContext) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Debugger for LlmDebugger {
    #[instrument(skip_all, fields(failing = input.report.failed_count()))]
    async fn debug(&self, input: &DebugInput) -> Result<DebugFeedback, AgentError> {
        let prompt = self
            .llm
            .prompts
            .debugger(&input.problem, &input.plan, &input.code, &input.report);
        let text = self.llm.complete(AgentKind::Debugger, prompt).await?;
        parse_json_payload(&text, &SCHEMA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedBackend, failing_report, llm_context, problem};

    fn input() -> DebugInput {
        DebugInput {
            problem: problem(),
            plan: "greedy".to_string(),
            code: "class Solution: pass".to_string(),
            report: failing_report(&["example_2"], 3),
        }
    }

    #[tokio::test]
    async fn replan_flag_defaults_to_false() {
        let backend = ScriptedBackend::new(vec![Ok(
            r#"{"diagnosis": "off by one", "suggested_fix": "use <="}"#.to_string(),
        )]);
        let debugger = LlmDebugger::new(llm_context(backend.clone()));
        let feedback = debugger.debug(&input()).await.expect("feedback");
        assert!(!feedback.replan);
        assert_eq!(feedback.diagnosis, "off by one");
        assert!(backend.prompts()[0].contains("Case example_2"));
    }

    #[tokio::test]
    async fn explicit_replan_is_preserved() {
        let backend = ScriptedBackend::new(vec![Ok(
            "```json\n{\"diagnosis\": \"greedy is wrong\", \"suggested_fix\": \"use dp\", \"replan\": true}\n```"
                .to_string(),
        )]);
        let debugger = LlmDebugger::new(llm_context(backend));
        let feedback = debugger.debug(&input()).await.expect("feedback");
        assert!(feedback.replan);
    }
}
