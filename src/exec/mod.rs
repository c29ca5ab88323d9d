// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`interpreter`] dispatches each step verb to the device and owns the
//!   per-step timing (inter-step delay, swipe settle, navigation settle).
//! - [`lifecycle`] launches the task's app cleanly and tears it down
//!   afterwards, returning to the host app.

pub mod interpreter;
pub mod lifecycle;

pub use interpreter::{
    InterpreterSettings, MAX_LOOP_ITERATIONS, StepFailure, StepInterpreter, TaskPhase,
    render_screenshot_path, step_percent,
};
pub use lifecycle::LifecycleManager;
