// src/engine/progress.rs

//! Progress / log sink.
//!
//! The scheduler and interpreter report what they are doing through a
//! [`ProgressSink`] handed to them in the
//! [`ExecutionContext`](crate::engine::ExecutionContext). There is no global
//! sink: whoever starts a run decides where the events go.

use std::fmt;

use serde::Serialize;
use tracing::Level;

/// Display colour associated with a task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorHint {
    Pending,
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl ColorHint {
    pub fn hex(self) -> &'static str {
        match self {
            ColorHint::Pending => "#666666",
            ColorHint::Running => "#FF9800",
            ColorHint::Succeeded => "#4CAF50",
            ColorHint::Failed => "#F44336",
            ColorHint::Stopped => "#FF5722",
        }
    }
}

impl fmt::Display for ColorHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hex())
    }
}

/// One progress event for the task at `task_index` in the current run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub task_index: usize,
    pub percent: u8,
    pub status_text: String,
    pub color: ColorHint,
}

pub trait ProgressSink: Send + Sync {
    fn progress(&self, update: ProgressUpdate);
    fn log(&self, level: Level, message: &str);
}

/// Sink that renders everything through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn progress(&self, update: ProgressUpdate) {
        tracing::info!(
            target: "autosign::progress",
            task_index = update.task_index,
            percent = update.percent,
            color = %update.color,
            "{}",
            update.status_text
        );
    }

    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "autosign::run", "{message}"),
            Level::WARN => tracing::warn!(target: "autosign::run", "{message}"),
            Level::INFO => tracing::info!(target: "autosign::run", "{message}"),
            Level::DEBUG => tracing::debug!(target: "autosign::run", "{message}"),
            Level::TRACE => tracing::trace!(target: "autosign::run", "{message}"),
        }
    }
}
