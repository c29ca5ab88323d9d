// src/errors.rs

//! Crate-wide error types.
//!
//! - [`AutosignError`] covers configuration, IO and run-level failures.
//! - [`StepError`] is the per-step failure taxonomy the engine reports.
//! - [`SelectorError`] is returned when a selector string does not parse.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutosignError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(u32),

    #[error("a run is already active; refusing to start another")]
    RunAlreadyActive,

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a single step (or lifecycle action) failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    /// Selector polling exhausted its timeout.
    #[error("element not found: {selector} (after {timeout_ms}ms)")]
    ElementNotFound { selector: String, timeout_ms: u64 },

    /// No detection above the confidence threshold after all attempts.
    #[error("text not recognised on screen: \"{text}\" ({attempts} attempts)")]
    RecognitionNotFound { text: String, attempts: u32 },

    /// Unknown verb, missing required field or malformed selector.
    #[error("cannot dispatch step: {0}")]
    ActionDispatch(String),

    /// Cooperative cancellation observed at a suspension point.
    #[error("stopped by user")]
    StoppedByUser,

    /// Teardown / return-to-host problem. Never fails a task.
    #[error("app lifecycle: {0}")]
    AppLifecycle(String),

    /// A device collaborator reported an I/O level failure.
    #[error("device error: {0}")]
    Device(String),
}

impl StepError {
    pub fn is_stop(&self) -> bool {
        matches!(self, StepError::StoppedByUser)
    }

    pub(crate) fn device(err: anyhow::Error) -> Self {
        StepError::Device(format!("{err:#}"))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("unrecognised selector term `{0}`")]
    UnknownTerm(String),

    #[error("selector term `{term}` expects a quoted literal")]
    ExpectedLiteral { term: String },

    #[error("invalid regex in `{term}`: {reason}")]
    InvalidRegex { term: String, reason: String },

    #[error("`clickable(...)` only accepts true or false, got `{0}`")]
    InvalidClickable(String),

    #[error("`clickable(...)` cannot be used on its own")]
    BareClickable,
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AutosignError>;
pub type StepResult<T> = std::result::Result<T, StepError>;
