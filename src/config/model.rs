// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

/// Top-level task file as read from TOML.
///
/// ```toml
/// [settings]
/// step_delay_ms = 1000
///
/// [lifecycle]
/// host_package = "org.autojs.autojs6"
///
/// [[task]]
/// id = 1
/// name = "Forum"
/// package = "com.example.bbs"
///
///   [[task.steps]]
///   action = "launch"
///
///   [[task.steps]]
///   action = "wait_click"
///   selector = 'text("Sign In")'
///   timeout = 3000
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub settings: SettingsSection,

    #[serde(default)]
    pub lifecycle: LifecycleSection,

    #[serde(default)]
    pub device: DeviceSection,

    #[serde(default)]
    pub task: Vec<TaskConfig>,
}

/// Validated configuration. Only constructed through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub settings: SettingsSection,
    pub lifecycle: LifecycleSection,
    pub device: DeviceSection,
    pub task: Vec<TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            settings: raw.settings,
            lifecycle: raw.lifecycle,
            device: raw.device,
            task: raw.task,
        }
    }
}

/// `[settings]`: engine timing and recognition policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettingsSection {
    /// Delay after every successful step.
    pub step_delay_ms: u64,
    /// Delay between two tasks (not after the last one).
    pub task_delay_ms: u64,
    /// How often selector resolution re-queries the screen.
    pub poll_interval_ms: u64,
    /// Timeout for steps that do not set one.
    pub default_timeout_ms: u64,
    /// Wait after launching an app when the step has no `timeout`.
    pub launch_timeout_ms: u64,
    /// Pause between force-stop and launch.
    pub launch_settle_ms: u64,
    /// Pause after back / home.
    pub nav_settle_ms: u64,
    /// Margin added to a swipe's own duration.
    pub swipe_settle_ms: u64,
    pub recognition_threshold: f32,
    pub recognition_retries: u32,
    pub recognition_backoff_ms: u64,
    /// Fall back to text recognition when structural lookup is exhausted.
    pub recognition_fallback: bool,
    /// Screenshot path template (`{task}`, `{id}`, `{timestamp}`).
    pub screenshot_template: String,
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            step_delay_ms: 1000,
            task_delay_ms: 2000,
            poll_interval_ms: 200,
            default_timeout_ms: 5000,
            launch_timeout_ms: 3000,
            launch_settle_ms: 1000,
            nav_settle_ms: 1000,
            swipe_settle_ms: 500,
            recognition_threshold: 0.6,
            recognition_retries: 3,
            recognition_backoff_ms: 500,
            recognition_fallback: false,
            screenshot_template: "/sdcard/Pictures/autosign_{task}_{timestamp}.png".to_string(),
        }
    }
}

impl SettingsSection {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn task_delay(&self) -> Duration {
        Duration::from_millis(self.task_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn launch_settle(&self) -> Duration {
        Duration::from_millis(self.launch_settle_ms)
    }

    pub fn nav_settle(&self) -> Duration {
        Duration::from_millis(self.nav_settle_ms)
    }

    pub fn swipe_settle(&self) -> Duration {
        Duration::from_millis(self.swipe_settle_ms)
    }

    pub fn recognition_backoff(&self) -> Duration {
        Duration::from_millis(self.recognition_backoff_ms)
    }
}

/// `[lifecycle]`: launching, dismissing and returning to the host app.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleSection {
    /// Run teardown + return-to-host after each task.
    pub enabled: bool,
    /// Clean-launch the target app before tasks that don't start with `launch`.
    pub auto_launch: bool,
    /// Package of the app hosting the automation.
    pub host_package: String,
    /// Text in the host app's recent-apps card description.
    pub host_label: String,
    pub recents_settle_ms: u64,
    pub card_timeout_ms: u64,
    pub return_retries: u32,
    pub return_interval_ms: u64,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_launch: true,
            host_package: "org.autojs.autojs6".to_string(),
            host_label: "AutoJs6".to_string(),
            recents_settle_ms: 1000,
            card_timeout_ms: 3000,
            return_retries: 5,
            return_interval_ms: 1500,
        }
    }
}

impl LifecycleSection {
    pub fn recents_settle(&self) -> Duration {
        Duration::from_millis(self.recents_settle_ms)
    }

    pub fn card_timeout(&self) -> Duration {
        Duration::from_millis(self.card_timeout_ms)
    }

    pub fn return_interval(&self) -> Duration {
        Duration::from_millis(self.return_interval_ms)
    }
}

/// `[device]`: how the production ADB backend reaches the phone.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// Path to the `adb` binary.
    pub adb: String,
    /// Device serial (`adb -s`); `None` uses the only attached device.
    pub serial: Option<String>,
    /// Shell command printing JSON text detections for the current screen.
    pub ocr_command: Option<String>,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            adb: "adb".to_string(),
            serial: None,
            ocr_command: None,
        }
    }
}

/// `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub id: u32,
    pub name: String,
    /// Target app package.
    pub package: String,

    /// Text in the app's recent-apps card description; defaults to `name`.
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub description: Option<String>,

    /// Per-task override of `settings.step_delay_ms`.
    #[serde(default)]
    pub step_delay_ms: Option<u64>,

    /// Per-task override of `settings.default_timeout_ms`.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,

    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

fn default_enabled() -> bool {
    true
}

/// One step as written in the task file.
///
/// This is a flat record; which fields are required depends on `action`
/// and is only checked when the step is compiled into an
/// [`Action`](crate::task::Action).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepSpec {
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
    /// Milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Milliseconds.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub start: Option<[i32; 2]>,
    #[serde(default)]
    pub end: Option<[i32; 2]>,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub path: Option<String>,
    /// Milliseconds spent on the opened page in `click_loop`.
    #[serde(default)]
    pub dwell: Option<u64>,
}

impl StepSpec {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            ..Self::default()
        }
    }
}
