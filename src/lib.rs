// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod orchestrator;
pub mod report;
pub mod types;

use std::io::Write;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::RunSettings;
use crate::config::parse_actions;
use crate::dag::Job;
use crate::errors::DagrunError;
use crate::exec::ActionRegistry;
use crate::report::{JobStatus, render_json, render_text};
use crate::types::{FailurePolicy, OutputFormat};

pub use crate::orchestrator::{Orchestrator, OrchestratorOptions};

/// Exit code for plans or descriptors that fail to load or validate.
pub const EXIT_INVALID_INPUT: u8 = 64;
/// Exit code for unexpected internal failures.
pub const EXIT_INTERNAL: u8 = 70;

/// Map an error from [`run`] to a process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<DagrunError>() {
        Some(
            DagrunError::ConfigError(_)
            | DagrunError::Validation(_)
            | DagrunError::TomlError(_)
            | DagrunError::JsonError(_)
            | DagrunError::IoError(_),
        ) => EXIT_INVALID_INPUT,
        _ => EXIT_INTERNAL,
    }
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading (file or inline descriptors)
/// - CLI overrides of the run settings
/// - the orchestrator and its backends
/// - Ctrl-C handling
/// - rendering the summary to stdout
pub async fn run(args: CliArgs) -> Result<JobStatus> {
    let (settings, job) = load_job(&args)?;
    let options = resolve_options(&args, &settings);

    if args.dry_run {
        print_dry_run(&job, &options);
        return Ok(JobStatus::Succeeded);
    }

    let orchestrator = Orchestrator::new(ActionRegistry::with_builtins(), options);
    orchestrator.validate(&job).map_err(DagrunError::from)?;

    // Ctrl-C → cancel the job.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling job");
            cancel.cancel();
        });
    }

    let result = orchestrator.run_with_cancel(job, cancel).await?;

    let rendered = match args.output_format() {
        OutputFormat::Text => render_text(&result),
        OutputFormat::Json => render_json(&result)?,
    };
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes()).context("writing summary")?;
    if !rendered.ends_with('\n') {
        writeln!(stdout).context("writing summary")?;
    }

    Ok(result.overall_status)
}

/// Build the job from `--plan` or the inline descriptors.
fn load_job(args: &CliArgs) -> Result<(RunSettings, Job)> {
    if let Some(path) = &args.plan {
        let file = load_and_validate(path)
            .with_context(|| format!("loading plan {}", path.display()))?;
        debug!(path = %path.display(), tasks = file.job.len(), "loaded plan");
        return Ok((file.settings, file.job));
    }

    if args.actions.is_empty() {
        return Err(DagrunError::ConfigError(
            "nothing to run: pass --plan FILE or one or more ACTION descriptors".to_string(),
        )
        .into());
    }

    let job = parse_actions(&args.actions)?;
    let settings = RunSettings {
        concurrency: 4,
        workers: None,
        failure_policy: FailurePolicy::Continue,
        rate_limit_per_sec: None,
    };
    Ok((settings, job))
}

/// Plan settings with CLI flags layered on top.
fn resolve_options(args: &CliArgs, settings: &RunSettings) -> OrchestratorOptions {
    let mut options = OrchestratorOptions::default()
        .with_concurrency(args.concurrency.map_or(settings.concurrency, |n| n as usize))
        .with_failure_policy(if args.stop_on_error {
            FailurePolicy::Abort
        } else {
            settings.failure_policy
        });

    if let Some(workers) = args.workers.map(|n| n as usize).or(settings.workers) {
        options = options.with_workers(workers);
    }
    if let Some(rate) = args.rate.or(settings.rate_limit_per_sec) {
        options = options.with_rate_limit(rate);
    }
    options
}

/// Simple dry-run output: print settings, tasks and their dependencies.
fn print_dry_run(job: &Job, options: &OrchestratorOptions) {
    println!("dagrun dry-run: job {}", job.id());
    println!("  concurrency = {}", options.concurrency);
    println!("  workers = {}", options.workers.clamp(1, options.concurrency.max(1)));
    println!("  failure_policy = {:?}", options.failure_policy);
    if let Some(rate) = options.rate_limit_per_sec {
        println!("  rate_limit_per_sec = {rate}");
    }
    println!();

    println!("tasks ({}):", job.len());
    for task in job.tasks() {
        println!("  - {} [{:?}]", task.id, task.execution_kind);
        println!("      action: {} {}", task.action.name, task.action.input);
        if !task.dependencies.is_empty() {
            println!("      depends_on: {:?}", task.dependencies);
        }
        if let Some(t) = task.timeout {
            println!("      timeout: {:?}", t);
        }
        if task.max_retries > 0 {
            println!("      max_retries: {}", task.max_retries);
        }
    }

    debug!("dry-run complete (no execution)");
}
