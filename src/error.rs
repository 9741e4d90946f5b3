//! Error types for hookwork.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{ExecutionError, WorkId, WorkStatus};

#[derive(Debug, Error)]
pub enum Error {
    /// The script run failed; carried back to whoever called `terminate`.
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("work item {id} already terminated with status {status}")]
    AlreadyTerminated { id: WorkId, status: WorkStatus },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("cannot open log file {}: {source}", path.display())]
    LogOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error reading log file {}: {source}", path.display())]
    LogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("telemetry setup failed: {0}")]
    Telemetry(String),
}

pub type Result<T> = std::result::Result<T, Error>;
