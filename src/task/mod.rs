// src/task/mod.rs

//! Task and step model.
//!
//! - [`action`] holds the closed verb set and compiles raw steps into typed
//!   [`Action`]s.
//! - [`model`] holds [`Task`], [`Step`] and the [`TaskSet`].

pub mod action;
pub mod model;

pub use action::{Action, StepDefaults, Verb};
pub use model::{Step, Task, TaskId, TaskSet, TaskTiming};
