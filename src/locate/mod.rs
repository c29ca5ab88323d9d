// src/locate/mod.rs

//! Finding things on screen.
//!
//! - [`selector`] parses the selector grammar into a [`Selector`] value.
//! - [`resolver`] polls the screen element provider for a selector.
//! - [`recognition`] scans recognised text blocks for a target string.

pub mod recognition;
pub mod resolver;
pub mod selector;

pub use recognition::{RecognitionFallback, TextMatch};
pub use resolver::SelectorResolver;
pub use selector::{DescPattern, Selector};
