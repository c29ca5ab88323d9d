// src/locate/selector.rs

//! Selector grammar.
//!
//! ```text
//! selector := term ( "&&" term )*
//! term     := "text(" literal ")" | "desc(" literal ")" | "desc(" regex ")"
//!           | "id(" literal ")"  | "clickable(" ("true" | "false") ")"
//!           | literal
//! literal  := '"' chars '"'        (\" and \\ escapes)
//! regex    := '/' chars '/'
//! ```
//!
//! A bare literal is shorthand for `text(literal)`. `clickable(..)` is only
//! valid next to at least one other term.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::device::UiElement;
use crate::errors::SelectorError;

/// Anchored description regex, remembered with its source for display.
#[derive(Debug, Clone)]
pub struct DescPattern {
    source: String,
    regex: Regex,
}

impl DescPattern {
    pub fn new(source: &str) -> Result<Self, SelectorError> {
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| {
            SelectorError::InvalidRegex {
                term: format!("desc(/{source}/)"),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

impl PartialEq for DescPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Parsed element selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    ByText(String),
    ByDescription(String),
    ByDescriptionPattern(DescPattern),
    ById(String),
    /// All `parts` must match the same element; `clickable`, when set, must
    /// equal the element's clickable state.
    CompoundAnd {
        parts: Vec<Selector>,
        clickable: Option<bool>,
    },
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut parser = Parser { rest: input };
        let mut parts = Vec::new();
        let mut clickable = None;

        parser.skip_ws();
        if parser.rest.is_empty() {
            return Err(SelectorError::Empty);
        }

        loop {
            match parser.term()? {
                Term::Atom(sel) => parts.push(sel),
                Term::Clickable(c) => clickable = Some(c),
            }
            parser.skip_ws();
            if parser.rest.is_empty() {
                break;
            }
            if !parser.eat("&&") {
                return Err(SelectorError::UnknownTerm(parser.rest.to_string()));
            }
        }

        if parts.is_empty() {
            return Err(SelectorError::BareClickable);
        }
        if parts.len() == 1 && clickable.is_none() {
            return Ok(parts.remove(0));
        }
        Ok(Selector::CompoundAnd { parts, clickable })
    }

    /// Selector for an element whose description contains `needle`.
    pub fn desc_contains(needle: &str) -> Self {
        let source = format!("(?s).*{}.*", regex::escape(needle));
        match DescPattern::new(&source) {
            Ok(p) => Selector::ByDescriptionPattern(p),
            // An escaped literal always compiles.
            Err(_) => Selector::ByDescription(needle.to_string()),
        }
    }

    /// Whether a single element satisfies this selector.
    pub fn matches(&self, el: &UiElement) -> bool {
        match self {
            Selector::ByText(t) => el.text == *t,
            Selector::ByDescription(d) => el.desc == *d,
            Selector::ByDescriptionPattern(p) => p.is_match(&el.desc),
            Selector::ById(id) => el.id == *id || el.short_id() == id,
            Selector::CompoundAnd { parts, clickable } => {
                parts.iter().all(|p| p.matches(el))
                    && clickable.is_none_or(|c| el.clickable == c)
            }
        }
    }

    /// Literal on-screen text usable for recognition, if the selector
    /// carries one.
    pub fn literal_text(&self) -> Option<&str> {
        match self {
            Selector::ByText(t) | Selector::ByDescription(t) => Some(t),
            Selector::ByDescriptionPattern(_) | Selector::ById(_) => None,
            Selector::CompoundAnd { parts, .. } => parts.iter().find_map(|p| p.literal_text()),
        }
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::ByText(t) => write!(f, "text(\"{}\")", escape(t)),
            Selector::ByDescription(d) => write!(f, "desc(\"{}\")", escape(d)),
            Selector::ByDescriptionPattern(p) => write!(f, "desc(/{}/)", p.source()),
            Selector::ById(id) => write!(f, "id(\"{}\")", escape(id)),
            Selector::CompoundAnd { parts, clickable } => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" && ")?;
                    }
                    write!(f, "{part}")?;
                }
                if let Some(c) = clickable {
                    write!(f, " && clickable({c})")?;
                }
                Ok(())
            }
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

enum Term {
    Atom(Selector),
    Clickable(bool),
}

struct Parser<'a> {
    rest: &'a str,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn eat(&mut self, token: &str) -> bool {
        match self.rest.strip_prefix(token) {
            Some(r) => {
                self.rest = r;
                true
            }
            None => false,
        }
    }

    fn term(&mut self) -> Result<Term, SelectorError> {
        self.skip_ws();

        if self.rest.starts_with('"') {
            let lit = self.quoted()?;
            return Ok(Term::Atom(Selector::ByText(lit)));
        }

        let name_len = self
            .rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(self.rest.len());
        let name = &self.rest[..name_len];
        self.rest = &self.rest[name_len..];
        self.skip_ws();

        if name.is_empty() || !self.eat("(") {
            return Err(SelectorError::UnknownTerm(format!("{name}{}", self.rest)));
        }
        self.skip_ws();

        let term = match name {
            "text" => Term::Atom(Selector::ByText(self.literal_arg(name)?)),
            "id" => Term::Atom(Selector::ById(self.literal_arg(name)?)),
            "desc" if self.rest.starts_with('/') => {
                let source = self.regex_body()?;
                Term::Atom(Selector::ByDescriptionPattern(DescPattern::new(&source)?))
            }
            "desc" => Term::Atom(Selector::ByDescription(self.literal_arg(name)?)),
            "clickable" => {
                let end = self.rest.find(')').unwrap_or(self.rest.len());
                let word = self.rest[..end].trim();
                let value = match word {
                    "true" => true,
                    "false" => false,
                    other => return Err(SelectorError::InvalidClickable(other.to_string())),
                };
                self.rest = &self.rest[end..];
                Term::Clickable(value)
            }
            other => return Err(SelectorError::UnknownTerm(other.to_string())),
        };

        self.skip_ws();
        if !self.eat(")") {
            return Err(SelectorError::UnknownTerm(format!("{name}(…")));
        }
        Ok(term)
    }

    fn literal_arg(&mut self, name: &str) -> Result<String, SelectorError> {
        if !self.rest.starts_with('"') {
            return Err(SelectorError::ExpectedLiteral {
                term: name.to_string(),
            });
        }
        self.quoted()
    }

    /// Consume a double-quoted literal, unescaping `\"` and `\\`.
    fn quoted(&mut self) -> Result<String, SelectorError> {
        let mut out = String::new();
        let mut chars = self.rest.char_indices().skip(1);

        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                '"' => {
                    self.rest = &self.rest[i + 1..];
                    return Ok(out);
                }
                c => out.push(c),
            }
        }

        Err(SelectorError::ExpectedLiteral {
            term: format!("unterminated literal {}", self.rest),
        })
    }

    /// Consume `/.../`, ending at the first `/` followed by `)`.
    fn regex_body(&mut self) -> Result<String, SelectorError> {
        let body = &self.rest[1..];
        let end = body
            .char_indices()
            .filter(|&(_, c)| c == '/')
            .map(|(i, _)| i)
            .find(|&i| body[i + 1..].trim_start().starts_with(')'));

        match end {
            Some(i) => {
                let source = body[..i].to_string();
                self.rest = &body[i + 1..];
                Ok(source)
            }
            None => Err(SelectorError::InvalidRegex {
                term: format!("desc({})", self.rest),
                reason: "missing closing `/`".to_string(),
            }),
        }
    }
}
