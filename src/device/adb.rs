// src/device/adb.rs

//! Real device backend driven through `adb shell`.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::hierarchy::HierarchyParser;
use super::{
    BoxFuture, GestureDriver, Point, ScreenElementProvider, ScreenSize, TextDetection,
    TextRecognizer, UiElement,
};
use crate::config::DeviceSection;
use crate::locate::Selector;

const DUMP_PATH: &str = "/sdcard/autosign_window_dump.xml";

#[derive(Debug, Clone)]
struct CachedDump {
    taken: Instant,
    elements: Arc<Vec<UiElement>>,
}

/// Implements all three collaborator traits over one adb connection.
///
/// Hierarchy dumps are cached for `cache_ttl` so the parts of a compound
/// selector are evaluated against the same screen. Any gesture drops the
/// cache.
#[derive(Debug)]
pub struct AdbDevice {
    adb: String,
    serial: Option<String>,
    ocr_command: Option<String>,
    parser: HierarchyParser,
    focus: Regex,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedDump>>,
}

impl AdbDevice {
    pub fn new(section: &DeviceSection, cache_ttl: Duration) -> Result<Self> {
        Ok(Self {
            adb: section.adb.clone(),
            serial: section.serial.clone(),
            ocr_command: section.ocr_command.clone(),
            parser: HierarchyParser::new().context("compiling hierarchy patterns")?,
            focus: Regex::new(r"(?:mCurrentFocus|mFocusedApp)=.*?\s([A-Za-z][\w.]*)/")
                .context("compiling focus pattern")?,
            cache_ttl,
            cache: Mutex::new(None),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.adb);
        if let Some(serial) = self.serial.as_deref() {
            cmd.arg("-s").arg(serial);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run `adb shell <args>` and return stdout.
    async fn shell(&self, args: &[&str]) -> Result<String> {
        let line = args.join(" ");
        trace!(cmd = %line, "adb shell");
        let output = self
            .command()
            .arg("shell")
            .args(args)
            .output()
            .await
            .with_context(|| format!("running `{} shell {line}`", self.adb))?;

        if !output.status.success() {
            bail!(
                "`adb shell {line}` exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Issue an input command; the screen is about to change.
    async fn input(&self, args: &[&str]) -> Result<()> {
        self.invalidate();
        self.shell(args).await.map(|_| ())
    }

    async fn keyevent(&self, key: &str) -> Result<()> {
        self.input(&["input", "keyevent", key]).await
    }

    fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }

    fn cached(&self) -> Option<Arc<Vec<UiElement>>> {
        let cache = self.cache.lock().ok()?;
        cache
            .as_ref()
            .filter(|c| c.taken.elapsed() < self.cache_ttl)
            .map(|c| c.elements.clone())
    }

    async fn dump(&self) -> Result<Arc<Vec<UiElement>>> {
        if let Some(elements) = self.cached() {
            return Ok(elements);
        }

        let script = format!("uiautomator dump {DUMP_PATH} >/dev/null && cat {DUMP_PATH}");
        let xml = self.shell(&[script.as_str()]).await?;
        if !xml.contains("<hierarchy") {
            bail!("uiautomator dump returned no hierarchy");
        }

        let elements = Arc::new(self.parser.parse(&xml));
        debug!(nodes = elements.len(), "window hierarchy dumped");
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(CachedDump {
                taken: Instant::now(),
                elements: elements.clone(),
            });
        }
        Ok(elements)
    }

    /// Package of the focused window in `dumpsys window` output.
    pub fn parse_focus(&self, dumpsys: &str) -> Option<String> {
        dumpsys
            .lines()
            .filter_map(|line| self.focus.captures(line))
            .map(|caps| caps[1].to_string())
            .next()
    }

    async fn run_ocr(&self, command: &str) -> Result<Vec<TextDetection>> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("running recognition command `{command}`"))?;

        if !output.status.success() {
            bail!(
                "recognition command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        serde_json::from_slice(&output.stdout).context("parsing recognition output as JSON")
    }
}

/// Screen size from `wm size`; an override size wins over the physical one.
pub fn parse_wm_size(output: &str) -> Option<ScreenSize> {
    let parse = |prefix: &str| {
        output.lines().find_map(|line| {
            let dims = line.trim().strip_prefix(prefix)?.trim();
            let (w, h) = dims.split_once('x')?;
            Some(ScreenSize {
                width: w.trim().parse().ok()?,
                height: h.trim().parse().ok()?,
            })
        })
    };
    parse("Override size:").or_else(|| parse("Physical size:"))
}

/// Escape text for `input text`, which goes through the device shell and
/// treats `%s` as a space.
pub fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        match c {
            ' ' => out.push_str("%s"),
            '\\' | '\'' | '"' | '&' | '<' | '>' | '|' | ';' | '(' | ')' | '$' | '`' | '*'
            | '~' | '?' | '#' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

impl ScreenElementProvider for AdbDevice {
    fn find_all<'a>(&'a self, selector: &'a Selector) -> BoxFuture<'a, Result<Vec<UiElement>>> {
        Box::pin(async move {
            let elements = self.dump().await?;
            Ok(elements
                .iter()
                .filter(|el| selector.matches(el))
                .cloned()
                .collect())
        })
    }

    fn click<'a>(&'a self, element: &'a UiElement) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let c = element.center();
            self.input(&["input", "tap", &c.x.to_string(), &c.y.to_string()])
                .await
        })
    }

    fn set_text<'a>(&'a self, element: &'a UiElement, text: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.click(element).await?;
            self.keyevent("KEYCODE_MOVE_END").await?;
            for _ in 0..element.text.chars().count() {
                self.keyevent("KEYCODE_DEL").await?;
            }
            if !text.is_empty() {
                self.input(&["input", "text", &escape_input_text(text)])
                    .await?;
            }
            Ok(())
        })
    }

    fn foreground_package(&self) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            let out = self.shell(&["dumpsys", "window"]).await?;
            Ok(self.parse_focus(&out))
        })
    }

    fn screen_size(&self) -> BoxFuture<'_, Result<ScreenSize>> {
        Box::pin(async move {
            let out = self.shell(&["wm", "size"]).await?;
            parse_wm_size(&out).with_context(|| format!("unexpected `wm size` output: {out:?}"))
        })
    }
}

impl GestureDriver for AdbDevice {
    fn tap(&self, x: i32, y: i32) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.input(&["input", "tap", &x.to_string(), &y.to_string()])
                .await
        })
    }

    fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.input(&[
                "input",
                "swipe",
                &from.x.to_string(),
                &from.y.to_string(),
                &to.x.to_string(),
                &to.y.to_string(),
                &duration_ms.to_string(),
            ])
            .await
        })
    }

    fn press_back(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.keyevent("KEYCODE_BACK"))
    }

    fn press_home(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.keyevent("KEYCODE_HOME"))
    }

    fn open_recent_apps(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.keyevent("KEYCODE_APP_SWITCH"))
    }

    fn launch_app<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.input(&[
                "monkey",
                "-p",
                package,
                "-c",
                "android.intent.category.LAUNCHER",
                "1",
            ])
            .await
            .with_context(|| format!("launching {package}"))
        })
    }

    fn force_stop_app<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.input(&["am", "force-stop", package])
                .await
                .with_context(|| format!("force-stopping {package}"))
        })
    }

    fn capture_screenshot<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let target = path.to_string_lossy();
            self.shell(&["screencap", "-p", &target])
                .await
                .with_context(|| format!("capturing screenshot to {target}"))?;
            Ok(())
        })
    }
}

impl TextRecognizer for AdbDevice {
    fn detect(&self) -> BoxFuture<'_, Result<Vec<TextDetection>>> {
        Box::pin(async move {
            match self.ocr_command.as_deref() {
                Some(command) => self.run_ocr(command).await,
                None => Ok(Vec::new()),
            }
        })
    }
}
