// src/lib.rs

pub mod cli;
pub mod config;
pub mod device;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod locate;
pub mod logging;
pub mod task;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config_path, load_and_validate};
use crate::device::{AdbDevice, Device};
use crate::engine::{RunOutcome, RunResult, TaskScheduler, TaskStatus, TracingSink};
use crate::task::TaskSet;

/// Exit code when at least one task failed.
pub const EXIT_TASK_FAILED: i32 = 2;
/// Exit code when the run was stopped.
pub const EXIT_STOPPED: i32 = 130;

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - task file loading
/// - `--skip` / `--list` / `--dry-run` handling
/// - the adb-backed device and the scheduler
/// - Ctrl-C handling (cooperative stop)
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = args
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let mut cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading task file {}", config_path.display()))?;
    if let Some(serial) = args.serial.clone() {
        cfg.device.serial = Some(serial);
    }

    let mut tasks = TaskSet::from_config(&cfg);
    for id in args.skip.iter().copied() {
        if tasks.disable(id) {
            info!(task = id, "task disabled for this run");
        } else {
            warn!(task = id, "--skip names an unknown task id");
        }
    }

    if args.list {
        print_task_list(&tasks);
        return Ok(0);
    }

    if args.dry_run {
        let malformed = print_dry_run(&cfg, &tasks);
        return Ok(if malformed == 0 { 0 } else { 1 });
    }

    // Cache dumps for half a poll so compound selectors see one screen.
    let backend = AdbDevice::new(&cfg.device, cfg.settings.poll_interval() / 2)?;
    let device = Device::from_backend(Arc::new(backend));
    let scheduler = TaskScheduler::from_config(device, &cfg, Arc::new(TracingSink));

    // Ctrl-C → cooperative stop.
    {
        let stop = scheduler.stop_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl-C received; stopping after the current step");
            stop.stop();
        });
    }

    let result = match args.task {
        Some(id) => {
            let task = tasks.select(id)?;
            scheduler.run_single(task).await?
        }
        None => {
            let selected = tasks.select_enabled()?;
            scheduler.run_all(&selected).await?
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    Ok(exit_code(&result))
}

pub fn exit_code(result: &RunResult) -> i32 {
    match result.outcome {
        RunOutcome::Stopped => EXIT_STOPPED,
        RunOutcome::Completed if result.failed > 0 => EXIT_TASK_FAILED,
        RunOutcome::Completed => 0,
    }
}

fn print_task_list(tasks: &TaskSet) {
    println!("tasks ({}):", tasks.len());
    for task in tasks.iter() {
        let flag = if task.enabled { " " } else { "-" };
        println!(
            "  {flag} {:>3}  {:<20} {}  ({} steps)",
            task.id,
            task.name,
            task.package,
            task.steps.len()
        );
    }
}

/// Print the compiled task set. Returns the number of malformed steps.
fn print_dry_run(cfg: &ConfigFile, tasks: &TaskSet) -> usize {
    println!("autosign dry-run");
    println!("  settings.step_delay_ms = {}", cfg.settings.step_delay_ms);
    println!("  settings.task_delay_ms = {}", cfg.settings.task_delay_ms);
    println!("  settings.poll_interval_ms = {}", cfg.settings.poll_interval_ms);
    println!(
        "  settings.recognition_fallback = {}",
        cfg.settings.recognition_fallback
    );
    println!("  lifecycle.enabled = {}", cfg.lifecycle.enabled);
    println!("  lifecycle.host_package = {}", cfg.lifecycle.host_package);
    println!();

    let mut malformed = 0;
    println!("tasks ({}):", tasks.len());
    for task in tasks.iter() {
        let state = if task.enabled { "" } else { " (disabled)" };
        println!("  - [{}] {}{state}", task.id, task.name);
        println!("      package: {}", task.package);
        if let Some(ref desc) = task.description {
            println!("      description: {desc}");
        }
        if task.steps.is_empty() {
            println!("      !! no steps");
        }
        for (i, step) in task.steps.iter().enumerate() {
            match &step.action {
                Ok(action) => {
                    debug!(task = task.id, step = i, ?action, "compiled step");
                    println!("      {:>2}. {:<12} {}", i + 1, step.verb, step.description);
                }
                Err(reason) => {
                    malformed += 1;
                    println!("      {:>2}. !! {reason}", i + 1);
                }
            }
        }
    }

    debug!(malformed, "dry-run complete (no execution)");
    malformed
}

fn print_summary(result: &RunResult) {
    println!(
        "{} of {} task(s) succeeded in {:.1}s",
        result.succeeded,
        result.total,
        result.elapsed_ms as f64 / 1000.0
    );
    for report in result.tasks.iter() {
        let mark = match report.status {
            TaskStatus::Succeeded => "ok",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Stopped => "stopped",
            TaskStatus::Pending | TaskStatus::Executing => "?",
        };
        println!("  [{mark:>7}] {} {}", report.id, report.name);
        if let Some(ref err) = report.error {
            match report.failed_step {
                Some(ref step) => println!("            at '{step}': {err}"),
                None => println!("            {err}"),
            }
        }
        for w in report.warnings.iter() {
            println!("            warning: {w}");
        }
    }
    if result.outcome == RunOutcome::Stopped {
        println!("run stopped by user");
    }
}
