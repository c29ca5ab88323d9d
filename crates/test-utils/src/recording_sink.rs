use std::sync::Mutex;

use autosign::engine::{ProgressSink, ProgressUpdate};
use tracing::Level;

/// A sink that:
/// - records every progress update and log line
/// - forwards log lines to `tracing` so they show up in failing tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<ProgressUpdate>>,
    logs: Mutex<Vec<(Level, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// Progress updates for one task, in order.
    pub fn updates_for(&self, task_index: usize) -> Vec<ProgressUpdate> {
        self.updates()
            .into_iter()
            .filter(|u| u.task_index == task_index)
            .collect()
    }

    pub fn logs(&self) -> Vec<(Level, String)> {
        self.logs.lock().unwrap().clone()
    }

    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.logs()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    /// Log lines containing `needle`.
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.logs()
            .into_iter()
            .map(|(_, m)| m)
            .filter(|m| m.contains(needle))
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn progress(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }

    fn log(&self, level: Level, message: &str) {
        tracing::debug!(target: "autosign::test", %level, "{message}");
        self.logs.lock().unwrap().push((level, message.to_string()));
    }
}
