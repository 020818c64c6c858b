//! Run configuration stored in `weaver.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::outcome::ExternalChecks;
use crate::core::retry::RetryPolicy;
use crate::core::transitions::LoopLimits;

pub const DEFAULT_CONFIG_FILE: &str = "weaver.toml";

/// Upper bound for the run and per-call timeouts (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Weaver configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields and sections
/// fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct WeaverConfig {
    pub run: RunConfig,
    pub backend: BackendConfig,
    pub sandbox: SandboxConfig,
    pub judge: JudgeConfig,
    pub benchmark: BenchmarkConfig,
}

/// Loop bounds and toggles for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    pub max_debug_iterations: u32,
    pub max_optimize_iterations: u32,
    pub optimization_enabled: bool,
    pub submission_enabled: bool,
    pub benchmark_enabled: bool,
    /// Timeout for a single agent invocation.
    pub per_call_timeout_secs: u64,
    /// Wall-clock budget for the whole run.
    pub run_timeout_secs: u64,
    /// Retries of a single agent call after `Timeout` or `BackendUnavailable`.
    pub transient_retries: u32,
    /// First retry delay; doubles on each further retry.
    pub retry_backoff_ms: u64,
    /// Attempts of the Planning and Coding phases before their failure transition.
    pub max_phase_attempts: u32,
    pub max_replans: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_debug_iterations: 3,
            max_optimize_iterations: 1,
            optimization_enabled: true,
            submission_enabled: false,
            benchmark_enabled: false,
            per_call_timeout_secs: 120,
            run_timeout_secs: 30 * 60,
            transient_retries: 3,
            retry_backoff_ms: 500,
            max_phase_attempts: 2,
            max_replans: 1,
        }
    }
}

impl RunConfig {
    pub fn limits(&self) -> LoopLimits {
        LoopLimits {
            max_debug_iterations: self.max_debug_iterations,
            max_optimize_iterations: self.max_optimize_iterations,
            optimization_enabled: self.optimization_enabled,
            max_replans: self.max_replans,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.transient_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    pub fn external_checks(&self) -> ExternalChecks {
        ExternalChecks {
            submission: self.submission_enabled,
            benchmark: self.benchmark_enabled,
        }
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.per_call_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.per_call_timeout_secs == 0 || self.per_call_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(anyhow!(
                "run.per_call_timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
            ));
        }
        if self.run_timeout_secs == 0 || self.run_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(anyhow!(
                "run.run_timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
            ));
        }
        if self.max_phase_attempts == 0 {
            return Err(anyhow!("run.max_phase_attempts must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Command receiving the prompt on stdin (e.g. `["llm","-m","{model}"]`).
    pub command: Vec<String>,
    pub model: String,
    /// Global ceiling shared by every agent.
    pub requests_per_minute: u32,
    pub prompt_budget_bytes: usize,
    pub output_limit_bytes: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string(), "-m".to_string(), "{model}".to_string()],
            model: "gemini-1.5-pro-latest".to_string(),
            requests_per_minute: 60,
            prompt_budget_bytes: 48_000,
            output_limit_bytes: 200_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Python interpreter command.
    pub command: Vec<String>,
    /// Method or function to call; the first public `Solution` method when unset.
    pub entry_point: Option<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Ask the backend for extra test cases beyond the problem's examples.
    pub generate_cases: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string()],
            entry_point: None,
            timeout_secs: 10,
            output_limit_bytes: 1_000_000,
            generate_cases: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct JudgeConfig {
    /// Command receiving the code on stdin; `{problem}` is replaced by the problem id.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Command receiving the code on stdin and the suite id as its last argument.
    pub command: Vec<String>,
    pub suites: Vec<String>,
    pub pass_metric: String,
    pub pass_threshold: f64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            suites: Vec::new(),
            pass_metric: "pass_rate".to_string(),
            pass_threshold: 1.0,
        }
    }
}

fn command_present(command: &[String]) -> bool {
    command.first().is_some_and(|program| !program.trim().is_empty())
}

impl WeaverConfig {
    pub fn validate(&self) -> Result<()> {
        self.run.validate()?;
        if !command_present(&self.backend.command) {
            return Err(anyhow!("backend.command must be a non-empty array"));
        }
        if self.backend.model.trim().is_empty() {
            return Err(anyhow!("backend.model must not be empty"));
        }
        if self.backend.requests_per_minute == 0 {
            return Err(anyhow!("backend.requests_per_minute must be > 0"));
        }
        if self.backend.prompt_budget_bytes == 0 || self.backend.output_limit_bytes == 0 {
            return Err(anyhow!("backend byte limits must be > 0"));
        }
        if !command_present(&self.sandbox.command) {
            return Err(anyhow!("sandbox.command must be a non-empty array"));
        }
        if self.sandbox.timeout_secs == 0 || self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox timeout and output limit must be > 0"));
        }
        // A hung candidate must be killed by the sandbox, not abandoned by the call timeout.
        if self.sandbox.timeout_secs >= self.run.per_call_timeout_secs {
            return Err(anyhow!(
                "sandbox.timeout_secs ({}) must be below run.per_call_timeout_secs ({})",
                self.sandbox.timeout_secs,
                self.run.per_call_timeout_secs
            ));
        }
        if self.run.submission_enabled && !command_present(&self.judge.command) {
            return Err(anyhow!(
                "judge.command is required when run.submission_enabled is set"
            ));
        }
        if self.run.benchmark_enabled {
            if !command_present(&self.benchmark.command) {
                return Err(anyhow!(
                    "benchmark.command is required when run.benchmark_enabled is set"
                ));
            }
            if self.benchmark.suites.is_empty() {
                return Err(anyhow!(
                    "benchmark.suites must list at least one suite when run.benchmark_enabled is set"
                ));
            }
        }
        if !self.benchmark.pass_threshold.is_finite() {
            return Err(anyhow!("benchmark.pass_threshold must be a finite number"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WeaverConfig::default()`.
pub fn load_config(path: &Path) -> Result<WeaverConfig> {
    if !path.exists() {
        let cfg = WeaverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WeaverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &WeaverConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` next to `path` and rename it into place.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
