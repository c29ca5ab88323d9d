// src/task/action.rs

//! The closed set of step verbs and their typed parameters.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::StepSpec;
use crate::device::Point;
use crate::locate::Selector;

/// Verb tag as written in `action = "..."`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Launch,
    Click,
    WaitClick,
    WaitExists,
    ClickImage,
    Swipe,
    SwipeUp,
    SwipeDown,
    Back,
    Home,
    Sleep,
    Input,
    Screenshot,
    ClickLoop,
}

impl Verb {
    pub const ALL: [Verb; 14] = [
        Verb::Launch,
        Verb::Click,
        Verb::WaitClick,
        Verb::WaitExists,
        Verb::ClickImage,
        Verb::Swipe,
        Verb::SwipeUp,
        Verb::SwipeDown,
        Verb::Back,
        Verb::Home,
        Verb::Sleep,
        Verb::Input,
        Verb::Screenshot,
        Verb::ClickLoop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Launch => "launch",
            Verb::Click => "click",
            Verb::WaitClick => "wait_click",
            Verb::WaitExists => "wait_exists",
            Verb::ClickImage => "click_image",
            Verb::Swipe => "swipe",
            Verb::SwipeUp => "swipe_up",
            Verb::SwipeDown => "swipe_down",
            Verb::Back => "back",
            Verb::Home => "home",
            Verb::Sleep => "sleep",
            Verb::Input => "input",
            Verb::Screenshot => "screenshot",
            Verb::ClickLoop => "click_loop",
        }
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Verb::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown action `{s}`"))
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step with its parameters checked and its selector parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Launch {
        timeout: Duration,
    },
    /// Single lookup, then click.
    Click {
        selector: Selector,
        timeout: Duration,
    },
    /// Poll until present, then click.
    WaitClick {
        selector: Selector,
        timeout: Duration,
    },
    WaitExists {
        selector: Selector,
        timeout: Duration,
    },
    ClickImage {
        text: String,
        retries: u32,
        timeout: Option<Duration>,
    },
    Swipe {
        from: Point,
        to: Point,
        duration: Duration,
    },
    SwipeUp {
        count: u32,
        duration: Duration,
    },
    SwipeDown {
        count: u32,
        duration: Duration,
    },
    Back,
    Home,
    Sleep {
        duration: Duration,
    },
    Input {
        selector: Selector,
        text: String,
        timeout: Duration,
    },
    Screenshot {
        path_template: String,
    },
    /// Click, dwell, go back; repeat while the selector is on screen.
    ClickLoop {
        selector: Selector,
        dwell: Duration,
    },
}

impl Action {
    pub fn verb(&self) -> Verb {
        match self {
            Action::Launch { .. } => Verb::Launch,
            Action::Click { .. } => Verb::Click,
            Action::WaitClick { .. } => Verb::WaitClick,
            Action::WaitExists { .. } => Verb::WaitExists,
            Action::ClickImage { .. } => Verb::ClickImage,
            Action::Swipe { .. } => Verb::Swipe,
            Action::SwipeUp { .. } => Verb::SwipeUp,
            Action::SwipeDown { .. } => Verb::SwipeDown,
            Action::Back => Verb::Back,
            Action::Home => Verb::Home,
            Action::Sleep { .. } => Verb::Sleep,
            Action::Input { .. } => Verb::Input,
            Action::Screenshot { .. } => Verb::Screenshot,
            Action::ClickLoop { .. } => Verb::ClickLoop,
        }
    }
}

/// Defaults used while compiling a [`StepSpec`].
#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout: Duration,
    pub launch_timeout: Duration,
    pub recognition_retries: u32,
    pub screenshot_template: String,
}

const DEFAULT_SWIPE_DURATION: Duration = Duration::from_millis(300);
const DEFAULT_PAGE_SWIPE_DURATION: Duration = Duration::from_millis(500);
const DEFAULT_LOOP_DWELL: Duration = Duration::from_millis(6000);

/// Check a raw step against its verb's required-field contract.
pub fn compile(spec: &StepSpec, defaults: &StepDefaults) -> Result<Action, String> {
    let verb: Verb = spec.action.parse()?;
    let ms = Duration::from_millis;
    let timeout = spec.timeout.map(ms).unwrap_or(defaults.timeout);

    let action = match verb {
        Verb::Launch => Action::Launch {
            timeout: spec.timeout.map(ms).unwrap_or(defaults.launch_timeout),
        },
        Verb::Click => Action::Click {
            selector: selector(spec, verb)?,
            timeout,
        },
        Verb::WaitClick => Action::WaitClick {
            selector: selector(spec, verb)?,
            timeout,
        },
        Verb::WaitExists => Action::WaitExists {
            selector: selector(spec, verb)?,
            timeout,
        },
        Verb::ClickImage => Action::ClickImage {
            text: required(&spec.text, verb, "text")?.trim_matches('"').to_string(),
            retries: spec.retries.unwrap_or(defaults.recognition_retries),
            timeout: spec.timeout.map(ms),
        },
        Verb::Swipe => {
            let [x1, y1] = *required(&spec.start, verb, "start")?;
            let [x2, y2] = *required(&spec.end, verb, "end")?;
            Action::Swipe {
                from: Point { x: x1, y: y1 },
                to: Point { x: x2, y: y2 },
                duration: spec.duration.map(ms).unwrap_or(DEFAULT_SWIPE_DURATION),
            }
        }
        Verb::SwipeUp | Verb::SwipeDown => {
            let count = spec.count.unwrap_or(1);
            if count == 0 {
                return Err(format!("`{verb}` needs count >= 1"));
            }
            let duration = spec.duration.map(ms).unwrap_or(DEFAULT_PAGE_SWIPE_DURATION);
            if verb == Verb::SwipeUp {
                Action::SwipeUp { count, duration }
            } else {
                Action::SwipeDown { count, duration }
            }
        }
        Verb::Back => Action::Back,
        Verb::Home => Action::Home,
        Verb::Sleep => Action::Sleep {
            duration: ms(*required(&spec.duration, verb, "duration")?),
        },
        Verb::Input => Action::Input {
            selector: selector(spec, verb)?,
            text: required(&spec.text, verb, "text")?.clone(),
            timeout,
        },
        Verb::Screenshot => Action::Screenshot {
            path_template: spec
                .path
                .clone()
                .unwrap_or_else(|| defaults.screenshot_template.clone()),
        },
        Verb::ClickLoop => Action::ClickLoop {
            selector: selector(spec, verb)?,
            dwell: spec.dwell.map(ms).unwrap_or(DEFAULT_LOOP_DWELL),
        },
    };

    Ok(action)
}

fn required<'a, T>(field: &'a Option<T>, verb: Verb, name: &str) -> Result<&'a T, String> {
    field
        .as_ref()
        .ok_or_else(|| format!("`{verb}` requires `{name}`"))
}

fn selector(spec: &StepSpec, verb: Verb) -> Result<Selector, String> {
    let raw = required(&spec.selector, verb, "selector")?;
    Selector::parse(raw).map_err(|e| format!("`{verb}` selector {raw:?}: {e}"))
}
