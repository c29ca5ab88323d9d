// src/device/hierarchy.rs

//! Parser for `uiautomator dump` window hierarchies.
//!
//! The dump is a flat-enough XML document that every element is a `<node>`
//! tag with its properties as attributes, so a full XML parser is not
//! needed. Nesting is ignored; nodes come back in document (layout) order.

use regex::Regex;

use crate::device::{Rect, UiElement};

#[derive(Debug, Clone)]
pub struct HierarchyParser {
    node: Regex,
    attr: Regex,
    bounds: Regex,
}

impl HierarchyParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            node: Regex::new(r"<node\b([^>]*)>")?,
            attr: Regex::new(r#"([\w:-]+)="([^"]*)""#)?,
            bounds: Regex::new(r"^\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]$")?,
        })
    }

    /// Every `<node>` in the dump, in document order.
    pub fn parse(&self, xml: &str) -> Vec<UiElement> {
        self.node
            .captures_iter(xml)
            .filter_map(|caps| caps.get(1))
            .map(|attrs| self.element(attrs.as_str()))
            .collect()
    }

    fn element(&self, attrs: &str) -> UiElement {
        let mut el = UiElement::default();
        for caps in self.attr.captures_iter(attrs) {
            let value = unescape(&caps[2]);
            match &caps[1] {
                "text" => el.text = value,
                "content-desc" => el.desc = value,
                "resource-id" => el.id = value,
                "class" => el.class = value,
                "clickable" => el.clickable = value == "true",
                "bounds" => el.bounds = self.parse_bounds(&value).unwrap_or_default(),
                _ => {}
            }
        }
        el
    }

    /// `[left,top][right,bottom]`
    pub fn parse_bounds(&self, s: &str) -> Option<Rect> {
        let caps = self.bounds.captures(s.trim())?;
        let n = |i: usize| caps[i].parse::<i32>().ok();
        Some(Rect::new(n(1)?, n(2)?, n(3)?, n(4)?))
    }
}

/// Undo XML attribute escaping.
pub fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
