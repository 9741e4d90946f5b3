//! # hookwork
//!
//! Lifecycle tracking for webhook-triggered script runs.
//!
//! A [`model::WorkItem`] is one script invocation: a process-wide id,
//! an argument file and a log file named after it, a message sink for
//! live output, and a lock-guarded status moving from idle through
//! running to success or error. [`logs`] reads back a filtered view of
//! the log file, [`runner`] is a reference executor, and [`telemetry`]
//! wires up tracing and OpenTelemetry.

pub mod config;
pub mod error;
pub mod logs;
pub mod model;
pub mod runner;
pub mod sink;
pub mod telemetry;

pub use error::{Error, Result};
