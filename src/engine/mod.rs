// src/engine/mod.rs

//! Run orchestration.
//!
//! This module ties together:
//! - the per-run [`ExecutionContext`] and its cooperative [`StopHandle`]
//! - the [`ProgressSink`] that receives progress and log events
//! - the pure [`RunLedger`], which records task outcomes and builds the
//!   [`RunResult`]
//! - the async [`TaskScheduler`], which drives tasks one at a time
//!
//! The bookkeeping lives in [`ledger`]; the async/IO shell is implemented
//! in [`scheduler`].

pub mod context;
pub mod ledger;
pub mod progress;
pub mod scheduler;

pub use context::{ExecutionContext, StopHandle};
pub use ledger::{RunLedger, RunOutcome, RunResult, RunState, TaskReport, TaskStatus};
pub use progress::{ColorHint, ProgressSink, ProgressUpdate, TracingSink};
pub use scheduler::TaskScheduler;
