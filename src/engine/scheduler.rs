// src/engine/scheduler.rs

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::{ConfigFile, LifecycleSection, SettingsSection};
use crate::device::Device;
use crate::errors::{AutosignError, Result, StepError};
use crate::exec::{LifecycleManager, StepFailure, StepInterpreter};
use crate::task::Task;

use super::context::{ExecutionContext, StopHandle};
use super::ledger::{RunLedger, RunResult, TaskStatus};
use super::progress::{ColorHint, ProgressSink};

/// Runs tasks strictly one after another against a single device.
///
/// This is the async shell around [`RunLedger`]: it drives the interpreter
/// and the lifecycle manager, feeds the ledger, and reports progress. At
/// most one run is active at a time; a second `run_all`/`run_single` while
/// one is in progress is rejected, not queued.
pub struct TaskScheduler {
    interpreter: StepInterpreter,
    lifecycle: LifecycleManager,
    sink: Arc<dyn ProgressSink>,
    stop: StopHandle,
    active: AtomicBool,
    task_delay: Duration,
    launch_timeout: Duration,
}

impl fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("stop", &self.stop)
            .field("active", &self.active)
            .field("task_delay", &self.task_delay)
            .finish_non_exhaustive()
    }
}

/// Clears the stop flag and then the active flag when a run ends, however
/// it ends. A stop requested before a run starts is seen by that run.
struct RunGuard<'a> {
    active: &'a AtomicBool,
    stop: &'a StopHandle,
}

impl<'a> RunGuard<'a> {
    fn acquire(active: &'a AtomicBool, stop: &'a StopHandle) -> Result<Self> {
        active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AutosignError::RunAlreadyActive)?;
        Ok(Self { active, stop })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.stop.reset();
        self.active.store(false, Ordering::SeqCst);
    }
}

impl TaskScheduler {
    pub fn new(
        device: Device,
        settings: &SettingsSection,
        lifecycle: &LifecycleSection,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let interpreter = StepInterpreter::new(device.clone(), settings);
        let lifecycle = LifecycleManager::new(device, interpreter.resolver().clone(), lifecycle);
        Self {
            interpreter,
            lifecycle,
            sink,
            stop: StopHandle::new(),
            active: AtomicBool::new(false),
            task_delay: settings.task_delay(),
            launch_timeout: settings.launch_timeout(),
        }
    }

    pub fn from_config(device: Device, cfg: &ConfigFile, sink: Arc<dyn ProgressSink>) -> Self {
        Self::new(device, &cfg.settings, &cfg.lifecycle, sink)
    }

    /// Handle that can stop the current run from elsewhere (Ctrl-C, tests).
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request a cooperative stop of the active run.
    ///
    /// In-flight gestures finish, screen queries are abandoned, and no new
    /// step or task starts. A stop requested while idle applies to the next
    /// run.
    pub fn stop(&self) {
        info!("stop requested");
        self.stop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run every enabled task in order.
    pub async fn run_all(&self, tasks: &[Task]) -> Result<RunResult> {
        let enabled: Vec<&Task> = tasks.iter().filter(|t| t.enabled).collect();
        self.run(enabled).await
    }

    /// Run one task, whatever its enabled flag.
    pub async fn run_single(&self, task: &Task) -> Result<RunResult> {
        self.run(vec![task]).await
    }

    async fn run(&self, tasks: Vec<&Task>) -> Result<RunResult> {
        let _guard = RunGuard::acquire(&self.active, &self.stop)?;

        if tasks.is_empty() {
            info!("no enabled tasks; nothing to run");
            return Ok(RunResult::empty());
        }

        let mut ctx = ExecutionContext::new(self.stop.clone(), self.sink.clone());
        let mut ledger = RunLedger::new(&tasks);
        ledger.begin_run();
        info!(tasks = tasks.len(), "run started");

        for (index, task) in tasks.iter().enumerate() {
            ctx.progress_for(index, 0, format!("{} pending", task.name), ColorHint::Pending);
        }

        let total = tasks.len();
        for (index, task) in tasks.iter().enumerate() {
            if self.stop.is_stopped() {
                for skipped in ledger.stop_remaining(index) {
                    ctx.progress_for(skipped, 50, "stopped", ColorHint::Stopped);
                }
                ctx.warn(format!("run stopped; {} task(s) not started", total - index));
                break;
            }

            if task.steps.is_empty() {
                let failure = StepFailure {
                    step_index: 0,
                    description: "task has no steps".to_string(),
                    error: StepError::ActionDispatch("task has no steps".to_string()),
                    steps_executed: 0,
                };
                let now = Utc::now();
                ledger.start(index, now);
                ledger.fail(index, &failure, now);
                ctx.progress_for(index, 0, format!("{} failed", task.name), ColorHint::Failed);
                ctx.error(format!("[{}] has no steps; not started", task.name));
                continue;
            }

            ctx.begin_task(index);
            ledger.start(index, Utc::now());
            ctx.progress(30, format!("{} started", task.name), ColorHint::Running);
            ctx.info(format!(
                "[{}] starting task {}/{} ({})",
                task.name,
                index + 1,
                total,
                task.package
            ));

            match self.execute_task(task, &ctx).await {
                Ok(steps) => {
                    ledger.succeed(index, steps, Utc::now());
                    ctx.progress(100, format!("{} done", task.name), ColorHint::Succeeded);
                    ctx.info(format!(
                        "[{}] succeeded in {}ms",
                        task.name,
                        ctx.task_elapsed().as_millis()
                    ));
                }
                Err(failure) => match ledger.fail(index, &failure, Utc::now()) {
                    TaskStatus::Stopped => {
                        ctx.progress(50, format!("{} stopped", task.name), ColorHint::Stopped);
                        ctx.warn(format!(
                            "[{}] stopped before step {}",
                            task.name,
                            failure.step_index + 1
                        ));
                    }
                    _ => {
                        ctx.progress(0, format!("{} failed", task.name), ColorHint::Failed);
                    }
                },
            }

            let warnings = self.lifecycle.teardown(task, &ctx).await;
            ledger.warn(index, &warnings);
            ctx.end_task();

            if index + 1 < total && self.stop.sleep(self.task_delay).await.is_err() {
                debug!("stop observed during inter-task delay");
            }
        }

        let result = ledger.finish(ctx.run_elapsed());
        ctx.info(format!(
            "run finished: {}/{} succeeded, {} failed, {} stopped in {}ms",
            result.succeeded, result.total, result.failed, result.stopped, result.elapsed_ms
        ));
        Ok(result)
    }

    /// Clean launch (when configured) followed by the task's own steps.
    async fn execute_task(
        &self,
        task: &Task,
        ctx: &ExecutionContext,
    ) -> std::result::Result<usize, StepFailure> {
        if self.lifecycle.settings().enabled && self.lifecycle.wants_launch(task) {
            if let Err(error) = self
                .lifecycle
                .launch(task, &self.interpreter, self.launch_timeout, ctx)
                .await
            {
                if !error.is_stop() {
                    ctx.error(format!("[{}] clean launch failed: {}", task.name, error));
                }
                return Err(StepFailure {
                    step_index: 0,
                    description: format!("clean launch of {}", task.package),
                    error,
                    steps_executed: 0,
                });
            }
        }

        self.interpreter.run_steps(task, ctx).await
    }
}
