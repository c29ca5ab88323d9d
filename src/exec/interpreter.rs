// src/exec/interpreter.rs

//! Step interpreter: runs a task's steps one at a time against the device.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SettingsSection;
use crate::device::{Device, Point, UiElement};
use crate::engine::{ColorHint, ExecutionContext, StopHandle};
use crate::errors::{StepError, StepResult};
use crate::locate::{RecognitionFallback, Selector, SelectorResolver};
use crate::task::{Action, Step, Task};

/// Upper bound on `click_loop` iterations.
pub const MAX_LOOP_ITERATIONS: u32 = 50;

const LOOP_RETURN_SETTLE: Duration = Duration::from_millis(500);
const LOOP_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Where a task is in its execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Preparing,
    Executing(usize),
    Succeeded,
    Failed,
}

/// A step failure, with enough context to report it.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub step_index: usize,
    pub description: String,
    pub error: StepError,
    /// Steps dispatched before the task stopped, including the failing one.
    pub steps_executed: usize,
}

/// Timing and policy knobs taken from `[settings]`.
#[derive(Debug, Clone)]
pub struct InterpreterSettings {
    pub step_delay: Duration,
    pub launch_settle: Duration,
    pub nav_settle: Duration,
    pub swipe_settle: Duration,
    pub recognition_fallback: bool,
}

impl From<&SettingsSection> for InterpreterSettings {
    fn from(s: &SettingsSection) -> Self {
        Self {
            step_delay: s.step_delay(),
            launch_settle: s.launch_settle(),
            nav_settle: s.nav_settle(),
            swipe_settle: s.swipe_settle(),
            recognition_fallback: s.recognition_fallback,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepInterpreter {
    device: Device,
    resolver: SelectorResolver,
    recognition: RecognitionFallback,
    settings: InterpreterSettings,
}

impl StepInterpreter {
    pub fn new(device: Device, settings: &SettingsSection) -> Self {
        let resolver = SelectorResolver::new(device.screen.clone(), settings.poll_interval());
        let recognition = RecognitionFallback::new(device.ocr.clone())
            .with_threshold(settings.recognition_threshold)
            .with_retries(settings.recognition_retries, settings.recognition_backoff());

        Self {
            device,
            resolver,
            recognition,
            settings: InterpreterSettings::from(settings),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn resolver(&self) -> &SelectorResolver {
        &self.resolver
    }

    /// Run every step of `task` in order.
    ///
    /// Returns the number of steps executed. The first failing step ends
    /// the task; later steps are never dispatched.
    pub async fn run_steps(
        &self,
        task: &Task,
        ctx: &ExecutionContext,
    ) -> Result<usize, StepFailure> {
        let stop = ctx.stop_handle();
        let total = task.steps.len();
        let step_delay = task.timing.step_delay.unwrap_or(self.settings.step_delay);
        let mut phase = TaskPhase::Preparing;
        debug!(task = %task.name, ?phase, steps = total, "task phase");

        for (index, step) in task.steps.iter().enumerate() {
            if let Err(error) = stop.check() {
                return Err(StepFailure {
                    step_index: index,
                    description: step.description.clone(),
                    error,
                    steps_executed: index,
                });
            }

            phase = TaskPhase::Executing(index);
            debug!(task = %task.name, ?phase, verb = %step.verb, "task phase");
            ctx.progress(
                step_percent(index, total),
                format!("step {}/{}", index + 1, total),
                ColorHint::Running,
            );
            ctx.info(format!(
                "[{}] executing step {}/{}: {}",
                task.name,
                index + 1,
                total,
                step.description
            ));

            let started = Instant::now();
            if let Err(error) = self.execute_step(step, task, ctx).await {
                phase = TaskPhase::Failed;
                debug!(task = %task.name, ?phase, "task phase");
                if !error.is_stop() {
                    ctx.error(format!(
                        "[{}] step {}/{} '{}' failed: {}",
                        task.name,
                        index + 1,
                        total,
                        step.description,
                        error
                    ));
                }
                return Err(StepFailure {
                    step_index: index,
                    description: step.description.clone(),
                    error,
                    steps_executed: index + 1,
                });
            }
            debug!(
                task = %task.name,
                step = index,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "step done"
            );

            if let Err(error) = stop.sleep(step_delay).await {
                // All steps already ran: a stop during the final delay doesn't undo that.
                if index + 1 < total {
                    return Err(StepFailure {
                        step_index: index + 1,
                        description: task.steps[index + 1].description.clone(),
                        error,
                        steps_executed: index + 1,
                    });
                }
            }
        }

        phase = TaskPhase::Succeeded;
        debug!(task = %task.name, ?phase, "task phase");
        Ok(total)
    }

    /// Dispatch a single step.
    pub async fn execute_step(
        &self,
        step: &Step,
        task: &Task,
        ctx: &ExecutionContext,
    ) -> StepResult<()> {
        let action = step
            .action
            .as_ref()
            .map_err(|reason| StepError::ActionDispatch(reason.clone()))?;
        self.dispatch(action, task, ctx).await
    }

    async fn dispatch(&self, action: &Action, task: &Task, ctx: &ExecutionContext) -> StepResult<()> {
        let stop = ctx.stop_handle();

        match action {
            Action::Launch { timeout } => self.launch_app(&task.package, *timeout, ctx).await,

            Action::Click { selector, timeout } => {
                let found = self.resolver.find_once(selector, *timeout, stop).await?;
                self.click_or_fallback(selector, found, *timeout, stop).await
            }

            Action::WaitClick { selector, timeout } => {
                let found = self.resolver.resolve(selector, *timeout, stop).await?;
                self.click_or_fallback(selector, found, *timeout, stop).await
            }

            Action::WaitExists { selector, timeout } => {
                match self.resolver.resolve(selector, *timeout, stop).await? {
                    Some(_) => Ok(()),
                    None => Err(not_found(selector, *timeout)),
                }
            }

            Action::ClickImage {
                text,
                retries,
                timeout,
            } => {
                let hit = self
                    .recognition
                    .match_text_with(text, *retries, *timeout, stop)
                    .await?;
                self.tap(hit.position).await
            }

            Action::Swipe { from, to, duration } => {
                self.swipe(*from, *to, *duration, stop).await
            }

            Action::SwipeUp { count, duration } => {
                self.page_swipe(true, *count, *duration, stop).await
            }

            Action::SwipeDown { count, duration } => {
                self.page_swipe(false, *count, *duration, stop).await
            }

            Action::Back => {
                self.device.gestures.press_back().await.map_err(StepError::device)?;
                stop.sleep(self.settings.nav_settle).await
            }

            Action::Home => {
                self.device.gestures.press_home().await.map_err(StepError::device)?;
                stop.sleep(self.settings.nav_settle).await
            }

            Action::Sleep { duration } => stop.sleep(*duration).await,

            Action::Input {
                selector,
                text,
                timeout,
            } => {
                let el = self
                    .resolver
                    .resolve(selector, *timeout, stop)
                    .await?
                    .ok_or_else(|| not_found(selector, *timeout))?;
                self.device
                    .screen
                    .set_text(&el, text)
                    .await
                    .map_err(StepError::device)
            }

            Action::Screenshot { path_template } => {
                let path = render_screenshot_path(path_template, task, Local::now());
                self.device
                    .gestures
                    .capture_screenshot(&path)
                    .await
                    .map_err(StepError::device)?;
                ctx.info(format!("[{}] screenshot saved: {}", task.name, path.display()));
                Ok(())
            }

            Action::ClickLoop { selector, dwell } => self.click_loop(selector, *dwell, ctx).await,
        }
    }

    /// Clean launch: force-stop (best effort), settle, launch, wait.
    pub async fn launch_app(
        &self,
        package: &str,
        timeout: Duration,
        ctx: &ExecutionContext,
    ) -> StepResult<()> {
        let stop = ctx.stop_handle();

        if let Err(err) = self.device.gestures.force_stop_app(package).await {
            warn!(package, error = %err, "force-stop failed; launching anyway");
            ctx.warn(format!("force-stop of {package} failed: {err}"));
        }
        stop.sleep(self.settings.launch_settle).await?;

        info!(package, "launching app");
        self.device
            .gestures
            .launch_app(package)
            .await
            .map_err(StepError::device)?;
        stop.sleep(timeout).await
    }

    async fn click_or_fallback(
        &self,
        selector: &Selector,
        found: Option<UiElement>,
        timeout: Duration,
        stop: &StopHandle,
    ) -> StepResult<()> {
        if let Some(el) = found {
            return self.click_element(&el).await;
        }

        if self.settings.recognition_fallback {
            if let Some(text) = selector.literal_text() {
                debug!(%selector, text, "structural lookup exhausted; trying recognition");
                match self.recognition.match_text(text, stop).await {
                    Ok(hit) => return self.tap(hit.position).await,
                    Err(StepError::RecognitionNotFound { .. }) => {}
                    Err(other) => return Err(other),
                }
            }
        }

        Err(not_found(selector, timeout))
    }

    /// Use the element's own click when it is clickable, else tap its center.
    async fn click_element(&self, el: &UiElement) -> StepResult<()> {
        if el.clickable {
            self.device.screen.click(el).await.map_err(StepError::device)
        } else {
            debug!(text = %el.text, desc = %el.desc, "element not clickable; tapping its center");
            self.tap(el.center()).await
        }
    }

    async fn tap(&self, p: Point) -> StepResult<()> {
        self.device
            .gestures
            .tap(p.x, p.y)
            .await
            .map_err(StepError::device)
    }

    /// Issue one swipe; completes after its duration plus the settle margin.
    async fn swipe(
        &self,
        from: Point,
        to: Point,
        duration: Duration,
        stop: &StopHandle,
    ) -> StepResult<()> {
        let started = Instant::now();
        self.device
            .gestures
            .swipe(from, to, duration.as_millis() as u64)
            .await
            .map_err(StepError::device)?;
        let total = duration + self.settings.swipe_settle;
        stop.sleep(total.saturating_sub(started.elapsed())).await
    }

    async fn page_swipe(
        &self,
        up: bool,
        count: u32,
        duration: Duration,
        stop: &StopHandle,
    ) -> StepResult<()> {
        let size = self
            .device
            .screen
            .screen_size()
            .await
            .map_err(StepError::device)?;
        let x = size.width / 2;
        let low = Point { x, y: size.height * 3 / 4 };
        let high = Point { x, y: size.height / 4 };
        let (from, to) = if up { (low, high) } else { (high, low) };

        for _ in 0..count {
            stop.check()?;
            self.swipe(from, to, duration, stop).await?;
        }
        Ok(())
    }

    async fn click_loop(
        &self,
        selector: &Selector,
        dwell: Duration,
        ctx: &ExecutionContext,
    ) -> StepResult<()> {
        let stop = ctx.stop_handle();
        let probe = self.resolver.poll_interval();
        let mut clicks = 0u32;

        for _ in 0..MAX_LOOP_ITERATIONS {
            let Some(el) = self.resolver.find_once(selector, probe, stop).await? else {
                ctx.info(format!("loop on {selector} finished after {clicks} clicks"));
                return Ok(());
            };

            if let Err(err) = self.click_element(&el).await {
                if err.is_stop() {
                    return Err(err);
                }
                ctx.warn(format!("click inside loop on {selector} failed: {err}"));
                stop.sleep(LOOP_RETRY_DELAY).await?;
                continue;
            }
            clicks += 1;

            stop.sleep(dwell).await?;
            self.device
                .gestures
                .press_back()
                .await
                .map_err(StepError::device)?;
            stop.sleep(LOOP_RETURN_SETTLE).await?;
        }

        ctx.warn(format!(
            "loop on {selector} hit the {MAX_LOOP_ITERATIONS}-iteration cap after {clicks} clicks"
        ));
        Ok(())
    }
}

fn not_found(selector: &Selector, timeout: Duration) -> StepError {
    StepError::ElementNotFound {
        selector: selector.to_string(),
        timeout_ms: timeout.as_millis() as u64,
    }
}

/// Progress percentage reported before step `index` of `total`.
pub fn step_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 30;
    }
    (30 + index * 60 / total) as u8
}

/// Fill `{task}`, `{id}` and `{timestamp}` in a screenshot path template.
pub fn render_screenshot_path(template: &str, task: &Task, now: DateTime<Local>) -> PathBuf {
    let safe_name: String = task
        .name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    PathBuf::from(
        template
            .replace("{task}", &safe_name)
            .replace("{id}", &task.id.to_string())
            .replace("{timestamp}", &now.format("%Y%m%d_%H%M%S").to_string()),
    )
}
