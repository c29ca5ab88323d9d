// src/device/mock.rs

//! Scripted in-memory device.
//!
//! Elements can be placed on screen immediately or after a delay (measured
//! on the tokio clock, so paused-time tests stay deterministic). Every
//! gesture is recorded as a [`DeviceAction`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::time::Instant;

use super::{
    BoxFuture, GestureDriver, Point, Rect, ScreenElementProvider, ScreenSize, TextDetection,
    TextRecognizer, UiElement,
};
use crate::locate::Selector;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceAction {
    Tap { x: i32, y: i32 },
    Swipe { from: Point, to: Point, duration_ms: u64 },
    Back,
    Home,
    OpenRecents,
    Launch(String),
    ForceStop(String),
    Screenshot(PathBuf),
    ClickElement(UiElement),
    SetText { element: UiElement, text: String },
}

#[derive(Debug, Clone)]
struct ScriptedElement {
    element: UiElement,
    visible_from: Instant,
    /// Removed from the screen after this many clicks/taps on it.
    clicks_left: Option<u32>,
}

#[derive(Debug, Clone)]
struct TapTarget {
    area: Rect,
    package: String,
}

#[derive(Debug)]
struct MockState {
    elements: Vec<ScriptedElement>,
    detections: Vec<TextDetection>,
    tap_targets: Vec<TapTarget>,
    foreground: Option<String>,
    screen_size: ScreenSize,
    actions: Vec<DeviceAction>,
    queries: usize,
    detect_calls: usize,
    fail_force_stop: bool,
    fail_queries: bool,
    query_latency: Duration,
    detect_latency: Duration,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            detections: Vec::new(),
            tap_targets: Vec::new(),
            foreground: None,
            screen_size: ScreenSize {
                width: 1080,
                height: 2400,
            },
            actions: Vec::new(),
            queries: 0,
            detect_calls: 0,
            fail_force_stop: false,
            fail_queries: false,
            query_latency: Duration::ZERO,
            detect_latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Put an element on screen now.
    pub fn show(&self, element: UiElement) {
        self.show_after(element, Duration::ZERO);
    }

    /// Put an element on screen once `delay` has passed.
    pub fn show_after(&self, element: UiElement, delay: Duration) {
        self.state().elements.push(ScriptedElement {
            element,
            visible_from: Instant::now() + delay,
            clicks_left: None,
        });
    }

    /// Put an element on screen that disappears after `clicks` clicks.
    pub fn show_until_clicked(&self, element: UiElement, clicks: u32) {
        self.state().elements.push(ScriptedElement {
            element,
            visible_from: Instant::now(),
            clicks_left: Some(clicks),
        });
    }

    pub fn set_detections(&self, detections: Vec<TextDetection>) {
        self.state().detections = detections;
    }

    /// Tapping inside `area` brings `package` to the foreground.
    pub fn add_tap_target(&self, area: Rect, package: &str) {
        self.state().tap_targets.push(TapTarget {
            area,
            package: package.to_string(),
        });
    }

    pub fn set_foreground(&self, package: Option<&str>) {
        self.state().foreground = package.map(str::to_string);
    }

    pub fn set_screen_size(&self, width: i32, height: i32) {
        self.state().screen_size = ScreenSize { width, height };
    }

    pub fn fail_force_stop(&self, fail: bool) {
        self.state().fail_force_stop = fail;
    }

    /// Make every element query take `latency` before answering, like a
    /// slow hierarchy dump.
    pub fn set_query_latency(&self, latency: Duration) {
        self.state().query_latency = latency;
    }

    /// Make every text detection take `latency` before answering.
    pub fn set_detect_latency(&self, latency: Duration) {
        self.state().detect_latency = latency;
    }

    /// Make every element query return an error.
    pub fn fail_queries(&self, fail: bool) {
        self.state().fail_queries = fail;
    }

    pub fn actions(&self) -> Vec<DeviceAction> {
        self.state().actions.clone()
    }

    pub fn clear_actions(&self) {
        self.state().actions.clear();
    }

    pub fn foreground(&self) -> Option<String> {
        self.state().foreground.clone()
    }

    /// Number of `find_all` calls so far.
    pub fn query_count(&self) -> usize {
        self.state().queries
    }

    /// Number of `detect` calls so far.
    pub fn detect_count(&self) -> usize {
        self.state().detect_calls
    }

    fn record(&self, action: DeviceAction) {
        self.state().actions.push(action);
    }

    fn consume_click(state: &mut MockState, hit: impl Fn(&UiElement) -> bool) {
        let now = Instant::now();
        for s in state.elements.iter_mut() {
            if s.visible_from <= now && hit(&s.element) {
                if let Some(left) = s.clicks_left.as_mut() {
                    *left = left.saturating_sub(1);
                }
            }
        }
        state.elements.retain(|s| s.clicks_left != Some(0));
    }
}

impl ScreenElementProvider for MockDevice {
    fn find_all<'a>(&'a self, selector: &'a Selector) -> BoxFuture<'a, Result<Vec<UiElement>>> {
        Box::pin(async move {
            let latency = {
                let mut state = self.state();
                state.queries += 1;
                state.query_latency
            };
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let state = self.state();
            if state.fail_queries {
                return Err(anyhow!("hierarchy dump failed"));
            }
            let now = Instant::now();
            Ok(state
                .elements
                .iter()
                .filter(|s| s.visible_from <= now && selector.matches(&s.element))
                .map(|s| s.element.clone())
                .collect())
        })
    }

    fn click<'a>(&'a self, element: &'a UiElement) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state();
            state.actions.push(DeviceAction::ClickElement(element.clone()));
            Self::consume_click(&mut state, |el| el == element);
            Ok(())
        })
    }

    fn set_text<'a>(&'a self, element: &'a UiElement, text: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state();
            state.actions.push(DeviceAction::SetText {
                element: element.clone(),
                text: text.to_string(),
            });
            for s in state.elements.iter_mut() {
                if s.element == *element {
                    s.element.text = text.to_string();
                }
            }
            Ok(())
        })
    }

    fn foreground_package(&self) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move { Ok(self.state().foreground.clone()) })
    }

    fn screen_size(&self) -> BoxFuture<'_, Result<ScreenSize>> {
        Box::pin(async move { Ok(self.state().screen_size) })
    }
}

impl GestureDriver for MockDevice {
    fn tap(&self, x: i32, y: i32) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state();
            state.actions.push(DeviceAction::Tap { x, y });
            let p = Point { x, y };
            let target = state
                .tap_targets
                .iter()
                .find(|t| t.area.contains(p))
                .map(|t| t.package.clone());
            if target.is_some() {
                state.foreground = target;
            }
            Self::consume_click(&mut state, |el| el.bounds.contains(p));
            Ok(())
        })
    }

    fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record(DeviceAction::Swipe {
                from,
                to,
                duration_ms,
            });
            Ok(())
        })
    }

    fn press_back(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record(DeviceAction::Back);
            Ok(())
        })
    }

    fn press_home(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state();
            state.actions.push(DeviceAction::Home);
            state.foreground = None;
            Ok(())
        })
    }

    fn open_recent_apps(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record(DeviceAction::OpenRecents);
            Ok(())
        })
    }

    fn launch_app<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state();
            state.actions.push(DeviceAction::Launch(package.to_string()));
            state.foreground = Some(package.to_string());
            Ok(())
        })
    }

    fn force_stop_app<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state();
            state
                .actions
                .push(DeviceAction::ForceStop(package.to_string()));
            if state.fail_force_stop {
                return Err(anyhow!("force-stop of {package} refused"));
            }
            if state.foreground.as_deref() == Some(package) {
                state.foreground = None;
            }
            Ok(())
        })
    }

    fn capture_screenshot<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(DeviceAction::Screenshot(path.to_path_buf()));
            Ok(())
        })
    }
}

impl TextRecognizer for MockDevice {
    fn detect(&self) -> BoxFuture<'_, Result<Vec<TextDetection>>> {
        Box::pin(async move {
            let latency = {
                let mut state = self.state();
                state.detect_calls += 1;
                state.detect_latency
            };
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Ok(self.state().detections.clone())
        })
    }
}
