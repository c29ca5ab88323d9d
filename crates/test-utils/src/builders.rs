#![allow(dead_code)]

use autosign::config::{ConfigFile, LifecycleSection, RawConfigFile, StepSpec, TaskConfig};
use autosign::device::{Rect, UiElement};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.config.task.push(task);
        self
    }

    pub fn step_delay_ms(mut self, ms: u64) -> Self {
        self.config.settings.step_delay_ms = ms;
        self
    }

    pub fn task_delay_ms(mut self, ms: u64) -> Self {
        self.config.settings.task_delay_ms = ms;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.settings.poll_interval_ms = ms;
        self
    }

    pub fn default_timeout_ms(mut self, ms: u64) -> Self {
        self.config.settings.default_timeout_ms = ms;
        self
    }

    pub fn recognition_fallback(mut self, on: bool) -> Self {
        self.config.settings.recognition_fallback = on;
        self
    }

    pub fn recognition_retries(mut self, retries: u32, backoff_ms: u64) -> Self {
        self.config.settings.recognition_retries = retries;
        self.config.settings.recognition_backoff_ms = backoff_ms;
        self
    }

    pub fn lifecycle(mut self, lifecycle: LifecycleSection) -> Self {
        self.config.lifecycle = lifecycle;
        self
    }

    /// No clean launch and no teardown: only the task's own steps touch
    /// the device.
    pub fn without_lifecycle(mut self) -> Self {
        self.config.lifecycle.enabled = false;
        self.config.lifecycle.auto_launch = false;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(id: u32, name: &str, package: &str) -> Self {
        Self {
            task: TaskConfig {
                id,
                name: name.to_string(),
                package: package.to_string(),
                label: None,
                enabled: true,
                description: None,
                step_delay_ms: None,
                default_timeout_ms: None,
                steps: vec![],
            },
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.task.label = Some(label.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.task.enabled = false;
        self
    }

    pub fn step(mut self, step: StepSpec) -> Self {
        self.task.steps.push(step);
        self
    }

    pub fn step_delay_ms(mut self, ms: u64) -> Self {
        self.task.step_delay_ms = Some(ms);
        self
    }

    pub fn default_timeout_ms(mut self, ms: u64) -> Self {
        self.task.default_timeout_ms = Some(ms);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Builder for a single raw step.
pub struct StepBuilder {
    step: StepSpec,
}

impl StepBuilder {
    pub fn new(action: &str) -> Self {
        Self {
            step: StepSpec::new(action),
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.step.description = Some(description.to_string());
        self
    }

    pub fn selector(mut self, selector: &str) -> Self {
        self.step.selector = Some(selector.to_string());
        self
    }

    pub fn timeout(mut self, ms: u64) -> Self {
        self.step.timeout = Some(ms);
        self
    }

    pub fn duration(mut self, ms: u64) -> Self {
        self.step.duration = Some(ms);
        self
    }

    pub fn swipe(mut self, start: [i32; 2], end: [i32; 2]) -> Self {
        self.step.start = Some(start);
        self.step.end = Some(end);
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.step.count = Some(count);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.step.text = Some(text.to_string());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.step.retries = Some(retries);
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.step.path = Some(path.to_string());
        self
    }

    pub fn dwell(mut self, ms: u64) -> Self {
        self.step.dwell = Some(ms);
        self
    }

    pub fn build(self) -> StepSpec {
        self.step
    }
}

/// `wait_click` on `text("...")`.
pub fn wait_click_text(text: &str, timeout_ms: u64) -> StepSpec {
    StepBuilder::new("wait_click")
        .describe(&format!("tap {text}"))
        .selector(&format!("text(\"{text}\")"))
        .timeout(timeout_ms)
        .build()
}

/// `wait_exists` on `text("...")`.
pub fn wait_exists_text(text: &str, timeout_ms: u64) -> StepSpec {
    StepBuilder::new("wait_exists")
        .describe(&format!("see {text}"))
        .selector(&format!("text(\"{text}\")"))
        .timeout(timeout_ms)
        .build()
}

pub fn launch(timeout_ms: u64) -> StepSpec {
    StepBuilder::new("launch")
        .describe("start app")
        .timeout(timeout_ms)
        .build()
}

/// Clickable element with the given text.
pub fn button(text: &str, bounds: Rect) -> UiElement {
    UiElement {
        text: text.to_string(),
        class: "android.widget.Button".to_string(),
        clickable: true,
        bounds,
        ..UiElement::default()
    }
}

/// Non-clickable label with the given text.
pub fn label(text: &str, bounds: Rect) -> UiElement {
    UiElement {
        text: text.to_string(),
        class: "android.widget.TextView".to_string(),
        clickable: false,
        bounds,
        ..UiElement::default()
    }
}

/// Recent-apps card whose description carries `desc`.
pub fn card(desc: &str, bounds: Rect) -> UiElement {
    UiElement {
        desc: desc.to_string(),
        class: "android.widget.FrameLayout".to_string(),
        clickable: true,
        bounds,
        ..UiElement::default()
    }
}
