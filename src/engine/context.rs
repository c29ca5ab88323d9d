// src/engine/context.rs

//! Per-run execution context and the cooperative stop flag.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::Level;

use crate::engine::progress::{ColorHint, ProgressSink, ProgressUpdate};
use crate::errors::{StepError, StepResult};

#[derive(Debug, Default)]
struct StopInner {
    flag: AtomicBool,
    notify: Notify,
}

/// Shared stop flag.
///
/// Setting it never interrupts an in-flight gesture. It is observed at
/// suspension points ([`StopHandle::check`], [`StopHandle::sleep`]) and by
/// screen queries wrapped in [`StopHandle::race`], which are abandoned.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopInner>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.inner.flag.store(false, Ordering::SeqCst);
    }

    /// Suspension point without a delay.
    pub fn check(&self) -> StepResult<()> {
        if self.is_stopped() {
            Err(StepError::StoppedByUser)
        } else {
            Ok(())
        }
    }

    /// Cancellable delay. Returns `StoppedByUser` if stop was requested
    /// before or during the wait.
    pub async fn sleep(&self, duration: Duration) -> StepResult<()> {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent stop() is not missed.
        notified.as_mut().enable();

        self.check()?;
        if duration.is_zero() {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = &mut notified => Err(StepError::StoppedByUser),
        }
    }

    /// Await `fut` unless stop is requested first, in which case `fut` is
    /// dropped and `StoppedByUser` returned.
    pub async fn race<F: Future>(&self, fut: F) -> StepResult<F::Output> {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        self.check()?;

        tokio::select! {
            out = fut => Ok(out),
            _ = &mut notified => Err(StepError::StoppedByUser),
        }
    }
}

/// State owned by a single scheduler invocation.
pub struct ExecutionContext {
    stop: StopHandle,
    sink: Arc<dyn ProgressSink>,
    run_started: Instant,
    current: Option<CurrentTask>,
}

#[derive(Debug, Clone)]
struct CurrentTask {
    index: usize,
    started: Instant,
}

impl ExecutionContext {
    pub fn new(stop: StopHandle, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            stop,
            sink,
            run_started: Instant::now(),
            current: None,
        }
    }

    pub fn stop_handle(&self) -> &StopHandle {
        &self.stop
    }

    pub fn begin_task(&mut self, index: usize) {
        self.current = Some(CurrentTask {
            index,
            started: Instant::now(),
        });
    }

    pub fn end_task(&mut self) {
        self.current = None;
    }

    pub fn task_index(&self) -> usize {
        self.current.as_ref().map(|c| c.index).unwrap_or(0)
    }

    pub fn run_elapsed(&self) -> Duration {
        self.run_started.elapsed()
    }

    pub fn task_elapsed(&self) -> Duration {
        self.current
            .as_ref()
            .map(|c| c.started.elapsed())
            .unwrap_or_default()
    }

    pub fn progress(&self, percent: u8, status_text: impl Into<String>, color: ColorHint) {
        self.progress_for(self.task_index(), percent, status_text, color);
    }

    pub fn progress_for(
        &self,
        task_index: usize,
        percent: u8,
        status_text: impl Into<String>,
        color: ColorHint,
    ) {
        self.sink.progress(ProgressUpdate {
            task_index,
            percent: percent.min(100),
            status_text: status_text.into(),
            color,
        });
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.sink.log(Level::INFO, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.sink.log(Level::WARN, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.sink.log(Level::ERROR, message.as_ref());
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("stop", &self.stop)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
