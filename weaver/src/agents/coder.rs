//! Coder backed by the language model.

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::core::errors::AgentError;
use crate::core::types::AgentKind;

use super::parse::extract_code_block;
use super::{CodeInput, Coder, LlmContext};

pub struct LlmCoder {
    llm: LlmContext,
}

impl LlmCoder {
    pub fn new(llm: LlmContext) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Coder for LlmCoder {
    #[instrument(skip_all, fields(problem = %input.problem.id, has_feedback = input.feedback.is_some()))]
    async fn code(&self, input: &CodeInput) -> Result<String, AgentError> {
        let prompt = self.llm.prompts.coder(
            &input.problem,
            &input.plan,
            &input.constraints,
            input.prior_code.as_deref(),
            input.feedback.as_ref(),
        );
        let text = self.llm.complete(AgentKind::Coder, prompt).await?;
        let code = extract_code_block(&text)?;
        debug!(code_bytes = code.len(), "extracted candidate code");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DebugFeedback, Feedback};
    use crate::test_support::{ScriptedBackend, llm_context, problem};

    fn input() -> CodeInput {
        CodeInput {
            problem: problem(),
            plan: "hash map".to_string(),
            constraints: vec!["n <= 10^4".to_string()],
            prior_code: Some("class Solution:\n    pass".to_string()),
            feedback: Some(Feedback::Debug(DebugFeedback {
                diagnosis: "returns None".to_string(),
                suggested_fix: "return the pair".to_string(),
                replan: false,
            })),
        }
    }

    #[tokio::test]
    async fn identical_inputs_yield_identical_code() {
        let reply = "```python\nclass Solution:\n    def twoSum(self, nums, target):\n        return [0, 1]\n```";
        let backend = ScriptedBackend::repeating(reply);
        let coder = LlmCoder::new(llm_context(backend.clone()));
        let first = coder.code(&input()).await.expect("first");
        let second = coder.code(&input()).await.expect("second");
        assert_eq!(first, second);
        let prompts = backend.prompts();
        assert_eq!(prompts[0], prompts[1]);
        assert!(prompts[0].contains("returns None"));
    }

    #[tokio::test]
    async fn prose_without_code_is_invalid() {
        let backend = ScriptedBackend::new(vec![Ok("I cannot solve this.".to_string())]);
        let coder = LlmCoder::new(llm_context(backend));
        let err = coder.code(&input()).await.expect_err("invalid");
        assert!(matches!(err, AgentError::InvalidOutput(_)));
    }
}
