//! Submitter: hands final code to the remote judge.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::errors::AgentError;
use crate::core::types::SubmissionReport;
use crate::io::judge::Judge;

use super::{SubmitInput, Submitter};

pub struct JudgeSubmitter {
    judge: Arc<dyn Judge>,
}

impl JudgeSubmitter {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl Submitter for JudgeSubmitter {
    async fn submit(&self, input: &SubmitInput) -> Result<SubmissionReport, AgentError> {
        Ok(self.judge.submit(&input.code).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::backend::CollaboratorError;

    struct Rejecting;

    #[async_trait]
    impl Judge for Rejecting {
        async fn submit(&self, _code: &str) -> Result<SubmissionReport, CollaboratorError> {
            Err(CollaboratorError::RateLimited("judge busy".to_string()))
        }
    }

    #[tokio::test]
    async fn judge_errors_become_agent_errors() {
        let submitter = JudgeSubmitter::new(Arc::new(Rejecting));
        let err = submitter
            .submit(&SubmitInput {
                code: "x".to_string(),
            })
            .await
            .expect_err("busy");
        assert!(err.is_retryable());
    }
}
