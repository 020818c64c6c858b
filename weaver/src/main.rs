//! Iterative refinement loop for programming problems.
//!
//! `weaver solve` drives one problem through analysis, coding, testing,
//! debugging, optimization and submission, prints the final code and exits
//! with a status-specific code (see [`weaver::exit_codes`]).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use weaver::agents::AgentSet;
use weaver::exit_codes;
use weaver::io::config::{
    DEFAULT_CONFIG_FILE, RunConfig, WeaverConfig, load_config, write_config,
};
use weaver::io::problem::load_problem;
use weaver::io::report::write_report;
use weaver::logging;
use weaver::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "weaver",
    version,
    about = "Iterative refinement loop for programming problems"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Solve one problem and print the final code.
    Solve {
        /// Markdown file holding the problem description.
        #[arg(long)]
        problem: PathBuf,
        /// Code template the solution must follow.
        #[arg(long)]
        starting_code: Option<PathBuf>,
        /// Write the structured run report (JSON) here.
        #[arg(long)]
        report: Option<PathBuf>,
        #[command(flatten)]
        overrides: RunOverrides,
    },
    /// Write a default config file if missing.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate the config file.
    CheckConfig,
}

/// Per-invocation overrides of the `[run]` section.
#[derive(Args, Debug, Default)]
struct RunOverrides {
    #[arg(long)]
    max_debug_iterations: Option<u32>,
    #[arg(long)]
    max_optimize_iterations: Option<u32>,
    /// Run the optimization phase.
    #[arg(long, conflicts_with = "no_optimize")]
    optimize: bool,
    /// Skip the optimization phase.
    #[arg(long)]
    no_optimize: bool,
    /// Submit the final code to the judge.
    #[arg(long)]
    submit: bool,
    /// Run the configured benchmark suites on the final code.
    #[arg(long)]
    benchmark: bool,
    #[arg(long)]
    per_call_timeout_secs: Option<u64>,
    #[arg(long)]
    run_timeout_secs: Option<u64>,
}

impl RunOverrides {
    fn apply(&self, run: &mut RunConfig) {
        if let Some(max) = self.max_debug_iterations {
            run.max_debug_iterations = max;
        }
        if let Some(max) = self.max_optimize_iterations {
            run.max_optimize_iterations = max;
        }
        if self.optimize {
            run.optimization_enabled = true;
        }
        if self.no_optimize {
            run.optimization_enabled = false;
        }
        if self.submit {
            run.submission_enabled = true;
        }
        if self.benchmark {
            run.benchmark_enabled = true;
        }
        if let Some(secs) = self.per_call_timeout_secs {
            run.per_call_timeout_secs = secs;
        }
        if let Some(secs) = self.run_timeout_secs {
            run.run_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Solve {
            problem,
            starting_code,
            report,
            overrides,
        } => {
            cmd_solve(
                &cli.config,
                &problem,
                starting_code.as_deref(),
                report.as_deref(),
                &overrides,
            )
            .await
        }
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::CheckConfig => cmd_check_config(&cli.config),
    }
}

async fn cmd_solve(
    config_path: &Path,
    problem_path: &Path,
    starting_code: Option<&Path>,
    report_path: Option<&Path>,
    overrides: &RunOverrides,
) -> Result<i32> {
    let mut cfg = load_config(config_path)?;
    overrides.apply(&mut cfg.run);
    cfg.validate().context("invalid configuration after overrides")?;
    let problem = load_problem(problem_path, starting_code)?;

    let agents = AgentSet::from_config(&cfg, &problem.id);
    let orchestrator = Orchestrator::new(agents, cfg.run.clone())
        .with_benchmark_suites(cfg.benchmark.suites.clone());
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next phase boundary");
            on_interrupt.cancel();
        }
    });

    let report = orchestrator.run(problem, &cancel).await;
    if let Some(path) = report_path {
        write_report(path, &report)?;
    }
    if let Some(code) = &report.final_code {
        println!("{code}");
    }
    if let Some(err) = &report.error {
        eprintln!("{}: {err}", report.status);
    }
    Ok(exit_codes::for_status(report.status))
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &WeaverConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    Ok(exit_codes::OK)
}

fn cmd_check_config(config_path: &Path) -> Result<i32> {
    if !config_path.exists() {
        bail!("{} not found (run `weaver init` first)", config_path.display());
    }
    load_config(config_path)?;
    Ok(exit_codes::OK)
}
