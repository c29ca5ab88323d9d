// src/task/model.rs

//! Tasks and steps as the engine sees them.

use std::time::Duration;

use crate::config::{ConfigFile, SettingsSection, StepSpec, TaskConfig};
use crate::errors::{AutosignError, Result};
use crate::task::action::{self, Action, StepDefaults, Verb};

pub type TaskId = u32;

/// A compiled step.
///
/// Compilation happens once, when the task is built. A step whose
/// parameters do not satisfy its verb keeps the reason and fails when it is
/// dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub description: String,
    /// `action` exactly as written in the task file.
    pub verb: String,
    pub action: std::result::Result<Action, String>,
}

impl Step {
    pub fn compile(spec: &StepSpec, defaults: &StepDefaults) -> Self {
        let description = spec
            .description
            .clone()
            .unwrap_or_else(|| spec.action.clone());
        Self {
            description,
            verb: spec.action.clone(),
            action: action::compile(spec, defaults),
        }
    }

    pub fn is_launch(&self) -> bool {
        matches!(self.action, Ok(Action::Launch { .. }))
    }
}

/// Per-task timing overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskTiming {
    pub step_delay: Option<Duration>,
    pub default_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub package: String,
    /// Recent-apps card sentinel.
    pub label: String,
    pub enabled: bool,
    pub description: Option<String>,
    pub steps: Vec<Step>,
    pub timing: TaskTiming,
}

impl Task {
    pub fn from_config(cfg: &TaskConfig, settings: &SettingsSection) -> Self {
        let timing = TaskTiming {
            step_delay: cfg.step_delay_ms.map(Duration::from_millis),
            default_timeout: cfg.default_timeout_ms.map(Duration::from_millis),
        };
        let defaults = StepDefaults {
            timeout: timing.default_timeout.unwrap_or(settings.default_timeout()),
            launch_timeout: settings.launch_timeout(),
            recognition_retries: settings.recognition_retries,
            screenshot_template: settings.screenshot_template.clone(),
        };

        Self {
            id: cfg.id,
            name: cfg.name.clone(),
            package: cfg.package.clone(),
            label: cfg.label.clone().unwrap_or_else(|| cfg.name.clone()),
            enabled: cfg.enabled,
            description: cfg.description.clone(),
            steps: cfg.steps.iter().map(|s| Step::compile(s, &defaults)).collect(),
            timing,
        }
    }

    pub fn starts_with_launch(&self) -> bool {
        self.steps.first().is_some_and(Step::is_launch)
    }

    /// Steps whose parameters do not satisfy their verb.
    pub fn malformed_steps(&self) -> impl Iterator<Item = (usize, &Step, &str)> {
        self.steps.iter().enumerate().filter_map(|(i, s)| match &s.action {
            Ok(_) => None,
            Err(reason) => Some((i, s, reason.as_str())),
        })
    }

    pub fn uses_verb(&self, verb: Verb) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(&s.action, Ok(a) if a.verb() == verb))
    }
}

/// The loaded task set.
///
/// Read-only to the engine apart from [`TaskSet::disable`].
#[derive(Debug, Clone, Default)]
pub struct TaskSet {
    tasks: Vec<Task>,
}

impl TaskSet {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(
            cfg.task
                .iter()
                .map(|t| Task::from_config(t, &cfg.settings))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Enabled tasks in file order.
    pub fn enabled(&self) -> Vec<Task> {
        self.tasks.iter().filter(|t| t.enabled).cloned().collect()
    }

    /// Disable a task. Returns `false` for an unknown id.
    pub fn disable(&mut self, id: TaskId) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.enabled = false;
                true
            }
            None => false,
        }
    }

    /// A single task chosen for execution; it must have at least one step.
    pub fn select(&self, id: TaskId) -> Result<&Task> {
        let task = self.get(id).ok_or(AutosignError::TaskNotFound(id))?;
        ensure_runnable(task)?;
        Ok(task)
    }

    /// Enabled tasks chosen for a full run; each must have at least one step.
    pub fn select_enabled(&self) -> Result<Vec<Task>> {
        let tasks = self.enabled();
        for task in tasks.iter() {
            ensure_runnable(task)?;
        }
        Ok(tasks)
    }
}

fn ensure_runnable(task: &Task) -> Result<()> {
    if task.steps.is_empty() {
        return Err(AutosignError::ConfigError(format!(
            "task {} ('{}') has no steps",
            task.id, task.name
        )));
    }
    Ok(())
}
