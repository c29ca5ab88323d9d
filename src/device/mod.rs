// src/device/mod.rs

//! Device collaborator interfaces.
//!
//! The engine never talks to a phone directly. It goes through three
//! traits:
//!
//! - [`ScreenElementProvider`] answers "which elements are on screen right
//!   now" and performs element-level actions (click, set text).
//! - [`GestureDriver`] issues raw input and app-management commands.
//! - [`TextRecognizer`] returns scored text detections for the current
//!   screen.
//!
//! [`adb::AdbDevice`] implements all three against a real device;
//! [`mock::MockDevice`] is a scripted in-memory device for tests.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::locate::Selector;

pub mod adb;
pub mod hierarchy;
pub mod mock;

pub use adb::AdbDevice;
pub use mock::{DeviceAction, MockDevice};

/// Boxed future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Screen rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.left + self.right) / 2,
            y: (self.top + self.bottom) / 2,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.top && p.y <= self.bottom
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: i32,
    pub height: i32,
}

/// Snapshot of one on-screen element.
///
/// Two lookups against an unchanged screen yield equal values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UiElement {
    pub text: String,
    pub desc: String,
    pub id: String,
    pub class: String,
    pub clickable: bool,
    pub bounds: Rect,
}

impl UiElement {
    pub fn center(&self) -> Point {
        self.bounds.center()
    }

    /// Resource id without the `package:id/` prefix.
    pub fn short_id(&self) -> &str {
        match self.id.rsplit_once(":id/") {
            Some((_, short)) => short,
            None => &self.id,
        }
    }
}

/// One scored text block from the recognition service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextDetection {
    pub label: String,
    pub confidence: f32,
    pub bounds: Rect,
}

/// Live screen structure.
pub trait ScreenElementProvider: Send + Sync {
    /// Elements currently on screen matching a single, non-compound
    /// selector, in layout order. An empty vector means "not there yet".
    fn find_all<'a>(&'a self, selector: &'a Selector) -> BoxFuture<'a, Result<Vec<UiElement>>>;

    /// Perform the element's own click action.
    fn click<'a>(&'a self, element: &'a UiElement) -> BoxFuture<'a, Result<()>>;

    /// Replace the element's text content.
    fn set_text<'a>(&'a self, element: &'a UiElement, text: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Package of the app currently in the foreground, if known.
    fn foreground_package(&self) -> BoxFuture<'_, Result<Option<String>>>;

    fn screen_size(&self) -> BoxFuture<'_, Result<ScreenSize>>;
}

/// Raw input and app management.
pub trait GestureDriver: Send + Sync {
    fn tap(&self, x: i32, y: i32) -> BoxFuture<'_, Result<()>>;
    fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> BoxFuture<'_, Result<()>>;
    fn press_back(&self) -> BoxFuture<'_, Result<()>>;
    fn press_home(&self) -> BoxFuture<'_, Result<()>>;
    fn open_recent_apps(&self) -> BoxFuture<'_, Result<()>>;
    fn launch_app<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<()>>;
    fn force_stop_app<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<()>>;
    fn capture_screenshot<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>>;
}

/// Opaque scored-text detection over the current screen.
pub trait TextRecognizer: Send + Sync {
    fn detect(&self) -> BoxFuture<'_, Result<Vec<TextDetection>>>;
}

/// The three collaborator handles the engine is built from.
#[derive(Clone)]
pub struct Device {
    pub screen: Arc<dyn ScreenElementProvider>,
    pub gestures: Arc<dyn GestureDriver>,
    pub ocr: Arc<dyn TextRecognizer>,
}

impl Device {
    /// Use one backend for all three roles.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ScreenElementProvider + GestureDriver + TextRecognizer + 'static,
    {
        Self {
            screen: backend.clone(),
            gestures: backend.clone(),
            ocr: backend,
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").finish_non_exhaustive()
    }
}
