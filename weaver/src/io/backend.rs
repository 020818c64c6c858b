//! Language-model backend abstraction.
//!
//! The [`Backend`] trait decouples agents from the text-generation service.
//! The default [`CommandBackend`] pipes the prompt through a configured
//! command; [`ThrottledBackend`] wraps any backend with the global rate limit.
//! Tests use scripted backends that return predetermined completions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::errors::AgentError;
use crate::io::process::{CommandOutput, build_command, run_command_async};
use crate::io::rate_limit::RateLimiter;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("invalid response: {0}")]
    Invalid(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<CollaboratorError> for AgentError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::RateLimited(detail) => {
                AgentError::BackendUnavailable(format!("rate limited: {detail}"))
            }
            CollaboratorError::Unavailable(detail) => AgentError::BackendUnavailable(detail),
            CollaboratorError::Timeout(detail) => AgentError::Timeout(detail),
            CollaboratorError::Invalid(detail) => AgentError::InvalidOutput(detail),
        }
    }
}

/// Per-request settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionConfig {
    pub model: String,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        config: &CompletionConfig,
    ) -> Result<String, CollaboratorError>;
}

/// Backend that runs a command with the prompt on stdin and reads the completion from stdout.
///
/// `{model}` in any argument is replaced by the configured model identifier.
pub struct CommandBackend {
    argv: Vec<String>,
}

impl CommandBackend {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl Backend for CommandBackend {
    #[instrument(skip_all, fields(model = %config.model, prompt_bytes = prompt.len()))]
    async fn complete(
        &self,
        prompt: &str,
        config: &CompletionConfig,
    ) -> Result<String, CollaboratorError> {
        let cmd = build_command(&self.argv, &[("model", config.model.as_str())])
            .map_err(|err| CollaboratorError::Unavailable(format!("{err:#}")))?;
        let output = run_command_async(
            cmd,
            Some(prompt.as_bytes().to_vec()),
            config.timeout,
            config.output_limit_bytes,
        )
        .await
        .map_err(|err| CollaboratorError::Unavailable(format!("{err:#}")))?;
        let text = classify_completion(&output)?;
        debug!(completion_bytes = text.len(), "backend completed");
        Ok(text)
    }
}

/// Map a finished backend process onto a completion or a typed error.
pub fn classify_completion(output: &CommandOutput) -> Result<String, CollaboratorError> {
    if output.timed_out {
        return Err(CollaboratorError::Timeout("backend command timed out".to_string()));
    }
    let stderr = output.stderr_text().to_lowercase();
    if !output.status.success() {
        if stderr.contains("rate limit") || stderr.contains("429") {
            return Err(CollaboratorError::RateLimited(output.failure_summary("backend")));
        }
        return Err(CollaboratorError::Unavailable(output.failure_summary("backend")));
    }
    let text = output.stdout_text();
    if text.trim().is_empty() {
        return Err(CollaboratorError::Invalid("backend returned no text".to_string()));
    }
    Ok(text)
}

/// Backend wrapper applying one shared rate limit to every request.
pub struct ThrottledBackend {
    inner: Arc<dyn Backend>,
    limiter: Arc<RateLimiter>,
}

impl ThrottledBackend {
    pub fn new(inner: Arc<dyn Backend>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl Backend for ThrottledBackend {
    async fn complete(
        &self,
        prompt: &str,
        config: &CompletionConfig,
    ) -> Result<String, CollaboratorError> {
        self.limiter.acquire().await;
        let result = self.inner.complete(prompt, config).await;
        if let Err(CollaboratorError::RateLimited(detail)) = &result {
            warn!(detail = %detail, "backend reported rate limiting");
        }
        result
    }
}
