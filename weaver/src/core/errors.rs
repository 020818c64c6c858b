//! Error taxonomy for agent calls and the control loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{AgentKind, Phase};

/// Failure of a single agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AgentError {
    /// The agent answered, but the answer failed validation.
    #[error("invalid output: {0}")]
    InvalidOutput(String),
    /// The backing collaborator could not serve the request.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("timed out: {0}")]
    Timeout(String),
}

impl AgentError {
    /// Transient failures are retried with identical input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::BackendUnavailable(_) | AgentError::Timeout(_)
        )
    }
}

/// Control-loop level outcome carried in the final report.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum WorkflowError {
    #[error("{bound} reached its limit of {limit}")]
    BoundExceeded { bound: String, limit: u64 },
    #[error("no progress: {0}")]
    NoProgress(String),
    #[error("{agent} failed: {error}")]
    CollaboratorFailure { agent: AgentKind, error: AgentError },
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: Phase, to: Phase },
    #[error("run cancelled")]
    Cancelled,
}

impl WorkflowError {
    pub fn bound(bound: &str, limit: u64) -> Self {
        WorkflowError::BoundExceeded {
            bound: bound.to_string(),
            limit,
        }
    }

    pub fn collaborator(agent: AgentKind, error: AgentError) -> Self {
        WorkflowError::CollaboratorFailure { agent, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(AgentError::Timeout("slow".into()).is_retryable());
        assert!(AgentError::BackendUnavailable("down".into()).is_retryable());
        assert!(!AgentError::InvalidOutput("garbage".into()).is_retryable());
    }

    #[test]
    fn workflow_error_serializes_with_kind_tag() {
        let err = WorkflowError::collaborator(
            AgentKind::Coder,
            AgentError::InvalidOutput("empty code".into()),
        );
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json["kind"], "collaborator_failure");
        assert_eq!(json["detail"]["agent"], "coder");
        assert_eq!(json["detail"]["error"]["kind"], "invalid_output");
        assert_eq!(err.to_string(), "coder failed: invalid output: empty code");
    }
}
