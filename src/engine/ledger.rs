// src/engine/ledger.rs

//! Pure run bookkeeping.
//!
//! [`RunLedger`] records what happened to every task of a run and turns it
//! into the [`RunResult`] handed back to the caller. It performs no IO and
//! never sleeps; the async scheduler feeds it transitions and timestamps.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::StepError;
use crate::exec::StepFailure;
use crate::task::{Task, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Pending,
    Executing,
    Succeeded,
    Failed,
    Stopped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Stopped
        )
    }
}

/// Scheduler state: `Idle -> Running -> {Completed, Stopped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Stopped,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Completed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Description of the step that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub steps_executed: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskReport {
    fn pending(task: &Task) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
            status: TaskStatus::Pending,
            error: None,
            failed_step: None,
            warnings: Vec::new(),
            steps_executed: 0,
            started_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub stopped: usize,
    pub elapsed_ms: u64,
    pub tasks: Vec<TaskReport>,
}

impl RunResult {
    /// Result of a run over an empty task set.
    pub fn empty() -> Self {
        Self {
            outcome: RunOutcome::Completed,
            total: 0,
            succeeded: 0,
            failed: 0,
            stopped: 0,
            elapsed_ms: 0,
            tasks: Vec::new(),
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

/// Per-run task records, indexed by position in the run.
#[derive(Debug, Clone)]
pub struct RunLedger {
    state: RunState,
    reports: Vec<TaskReport>,
}

impl RunLedger {
    pub fn new(tasks: &[&Task]) -> Self {
        Self {
            state: RunState::Idle,
            reports: tasks.iter().map(|t| TaskReport::pending(t)).collect(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn reports(&self) -> &[TaskReport] {
        &self.reports
    }

    pub fn status(&self, index: usize) -> Option<TaskStatus> {
        self.reports.get(index).map(|r| r.status)
    }

    pub fn begin_run(&mut self) {
        self.state = RunState::Running;
    }

    pub fn start(&mut self, index: usize, now: DateTime<Utc>) {
        if let Some(r) = self.reports.get_mut(index) {
            r.status = TaskStatus::Executing;
            r.started_at = Some(now);
        }
    }

    pub fn succeed(&mut self, index: usize, steps_executed: usize, now: DateTime<Utc>) {
        if let Some(r) = self.reports.get_mut(index) {
            r.status = TaskStatus::Succeeded;
            r.steps_executed = steps_executed;
            r.finished_at = Some(now);
        }
    }

    /// Record a task that ended early. A stop observed inside the task
    /// marks it `Stopped` rather than `Failed`.
    pub fn fail(&mut self, index: usize, failure: &StepFailure, now: DateTime<Utc>) -> TaskStatus {
        let Some(r) = self.reports.get_mut(index) else {
            return TaskStatus::Failed;
        };
        r.steps_executed = failure.steps_executed;
        r.finished_at = Some(now);
        r.error = Some(failure.error.to_string());
        if failure.error.is_stop() {
            r.status = TaskStatus::Stopped;
        } else {
            r.status = TaskStatus::Failed;
            r.failed_step = Some(failure.description.clone());
        }
        r.status
    }

    pub fn warn(&mut self, index: usize, warnings: &[StepError]) {
        if let Some(r) = self.reports.get_mut(index) {
            r.warnings.extend(warnings.iter().map(ToString::to_string));
        }
    }

    /// Mark every task from `from` on that never started as `Stopped`.
    /// Returns the indices that changed.
    pub fn stop_remaining(&mut self, from: usize) -> Vec<usize> {
        self.state = RunState::Stopped;
        let mut changed = Vec::new();
        for (index, r) in self.reports.iter_mut().enumerate().skip(from) {
            if r.status == TaskStatus::Pending {
                r.status = TaskStatus::Stopped;
                changed.push(index);
            }
        }
        changed
    }

    pub fn finish(self, elapsed: Duration) -> RunResult {
        let count = |s: TaskStatus| self.reports.iter().filter(|r| r.status == s).count();
        let succeeded = count(TaskStatus::Succeeded);
        let failed = count(TaskStatus::Failed);
        let stopped = count(TaskStatus::Stopped);

        let outcome = if self.state == RunState::Stopped || stopped > 0 {
            RunOutcome::Stopped
        } else {
            RunOutcome::Completed
        };
        RunResult {
            outcome,
            total: self.reports.len(),
            succeeded,
            failed,
            stopped,
            elapsed_ms: elapsed.as_millis() as u64,
            tasks: self.reports,
        }
    }
}
