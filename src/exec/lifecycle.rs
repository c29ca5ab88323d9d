// src/exec/lifecycle.rs

//! App lifecycle: clean launch before a task, dismissal and return to the
//! host app after it.
//!
//! Nothing in here fails a task. Teardown problems come back as
//! `StepError::AppLifecycle` warnings.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::LifecycleSection;
use crate::device::{Device, Point};
use crate::engine::{ExecutionContext, StopHandle};
use crate::errors::{StepError, StepResult};
use crate::exec::interpreter::StepInterpreter;
use crate::locate::{Selector, SelectorResolver};
use crate::task::Task;

const CARD_SWIPE_MS: u64 = 300;

#[derive(Debug, Clone)]
pub struct LifecycleManager {
    device: Device,
    resolver: SelectorResolver,
    settings: LifecycleSection,
}

impl LifecycleManager {
    pub fn new(device: Device, resolver: SelectorResolver, settings: &LifecycleSection) -> Self {
        Self {
            device,
            resolver,
            settings: settings.clone(),
        }
    }

    pub fn settings(&self) -> &LifecycleSection {
        &self.settings
    }

    /// Whether the scheduler should clean-launch `task` itself.
    pub fn wants_launch(&self, task: &Task) -> bool {
        self.settings.auto_launch && !task.starts_with_launch()
    }

    /// Clean launch through the interpreter's `launch` handler.
    pub async fn launch(
        &self,
        task: &Task,
        interpreter: &StepInterpreter,
        timeout: Duration,
        ctx: &ExecutionContext,
    ) -> StepResult<()> {
        interpreter.launch_app(&task.package, timeout, ctx).await
    }

    /// Dismiss the task's app and go back to the host app.
    ///
    /// Returns the problems encountered; an empty vector means both parts
    /// succeeded.
    pub async fn teardown(&self, task: &Task, ctx: &ExecutionContext) -> Vec<StepError> {
        if !self.settings.enabled {
            return Vec::new();
        }

        let mut warnings = Vec::new();

        if let Err(err) = self.dismiss(task).await {
            warn!(task = %task.name, error = %err, "dismiss via recents failed; pressing home");
            warnings.push(err);
            if let Err(home_err) = self.device.gestures.press_home().await {
                warnings.push(StepError::AppLifecycle(format!(
                    "home fallback failed: {home_err:#}"
                )));
            }
            tokio::time::sleep(self.settings.recents_settle()).await;
        }

        if let Err(err) = self.return_to_host(ctx.stop_handle()).await {
            warnings.push(err);
        }

        for w in warnings.iter() {
            ctx.warn(format!("[{}] {}", task.name, w));
        }
        warnings
    }

    /// Swipe the task's recent-apps card off screen.
    async fn dismiss(&self, task: &Task) -> StepResult<()> {
        self.device
            .gestures
            .open_recent_apps()
            .await
            .map_err(|e| lifecycle("opening recent apps", e))?;
        tokio::time::sleep(self.settings.recents_settle()).await;

        // Teardown still runs after stop, so it polls with its own handle.
        let card = self
            .resolver
            .resolve(
                &Selector::desc_contains(&task.label),
                self.settings.card_timeout(),
                &StopHandle::new(),
            )
            .await?
            .ok_or_else(|| {
                StepError::AppLifecycle(format!("no recent-apps card matching '{}'", task.label))
            })?;

        if card.bounds.is_empty() {
            return Err(StepError::AppLifecycle(format!(
                "recent-apps card for '{}' has empty bounds",
                task.label
            )));
        }

        let from = card.center();
        let to = Point { x: from.x, y: 0 };
        debug!(task = %task.name, ?from, ?to, "swiping recent-apps card away");
        self.device
            .gestures
            .swipe(from, to, CARD_SWIPE_MS)
            .await
            .map_err(|e| lifecycle("swiping card", e))?;
        tokio::time::sleep(self.settings.recents_settle()).await;
        Ok(())
    }

    /// Bring the host app back to the foreground and confirm it.
    pub async fn return_to_host(&self, stop: &StopHandle) -> StepResult<()> {
        let host = self.settings.host_package.as_str();

        if self.foreground_is(host).await {
            debug!(host, "host app already in foreground");
            return Ok(());
        }

        self.device
            .gestures
            .open_recent_apps()
            .await
            .map_err(|e| lifecycle("opening recent apps", e))?;
        tokio::time::sleep(self.settings.recents_settle()).await;

        let card = self
            .resolver
            .resolve(
                &Selector::desc_contains(&self.settings.host_label),
                self.settings.card_timeout(),
                &StopHandle::new(),
            )
            .await?
            .ok_or_else(|| {
                StepError::AppLifecycle(format!(
                    "no recent-apps card for host '{}'",
                    self.settings.host_label
                ))
            })?;

        let c = card.center();
        self.device
            .gestures
            .tap(c.x, c.y)
            .await
            .map_err(|e| lifecycle("tapping host card", e))?;

        for attempt in 1..=self.settings.return_retries {
            if stop.is_stopped() {
                return Err(StepError::AppLifecycle(
                    "stop requested before host app was confirmed".to_string(),
                ));
            }
            if self.foreground_is(host).await {
                info!(host, attempt, "returned to host app");
                return Ok(());
            }
            debug!(host, attempt, "host app not in foreground yet");
            if attempt < self.settings.return_retries {
                tokio::time::sleep(self.settings.return_interval()).await;
            }
        }

        Err(StepError::AppLifecycle(format!(
            "host app {host} not in foreground after {} checks",
            self.settings.return_retries
        )))
    }

    async fn foreground_is(&self, package: &str) -> bool {
        match self.device.screen.foreground_package().await {
            Ok(Some(current)) => current == package,
            Ok(None) => false,
            Err(err) => {
                debug!(error = %err, "could not read foreground package");
                false
            }
        }
    }
}

fn lifecycle(what: &str, err: anyhow::Error) -> StepError {
    StepError::AppLifecycle(format!("{what}: {err:#}"))
}
