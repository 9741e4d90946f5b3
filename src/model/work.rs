//! Work item: one script invocation and its outcome.
//!
//! Everything about a work item is fixed at construction except its
//! status. The status is a single tagged value behind a mutex, so the
//! error of a failed run can never be observed apart from the `Error`
//! status that carries it.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, info, warn};

use super::id::WorkId;
use super::naming;
use crate::error::{Error, Result};
use crate::sink::{self, MessageSink};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_work_span};

/// Default execution time budget, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a work item.
///
/// `Idle → Running → Success | Error`. `Success` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum WorkStatus {
    /// Created, not started yet.
    Idle,
    /// Script is running.
    Running,
    /// Done without error. Terminal.
    Success,
    /// Done with an error. Terminal.
    Error(ExecutionError),
}

impl WorkStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkStatus::Success | WorkStatus::Error(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Idle => "idle",
            WorkStatus::Running => "running",
            WorkStatus::Success => "success",
            WorkStatus::Error(_) => "error",
        }
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a script run failed. Reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExecutionError {
    #[error("script exited with status {code}")]
    Exit { code: i32 },

    #[error("script was terminated by a signal")]
    Signal,

    #[error("script timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("cannot start script: {0}")]
    Spawn(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Parameters for a new work item.
#[derive(Debug, Clone)]
pub struct NewWorkItem {
    pub(crate) name: String,
    pub(crate) script: PathBuf,
    pub(crate) payload: String,
    pub(crate) args: Vec<String>,
    pub(crate) timeout: u64,
    pub(crate) output_dir: PathBuf,
    pub(crate) sink_capacity: usize,
    pub(crate) created_at: Option<DateTime<Local>>,
}

impl NewWorkItem {
    pub fn new(name: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            payload: String::new(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
            output_dir: std::env::temp_dir(),
            sink_capacity: sink::DEFAULT_CAPACITY,
            created_at: None,
        }
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Time budget in seconds.
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity;
        self
    }

    /// Pin the creation timestamp used in file names. Defaults to now.
    pub fn created_at(mut self, at: DateTime<Local>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Create the work item. Draws a fresh id; never fails.
    pub fn build(self) -> WorkItem {
        let id = WorkId::next();
        let created_at = self.created_at.unwrap_or_else(Local::now);
        let arg_file = naming::arg_file(&self.output_dir, &self.name, id, &created_at);
        let log_file = naming::log_file(&self.output_dir, &self.name, id, &created_at);
        let span = start_work_span(&self.name, id);

        metrics::work_created().add(1, &[]);
        debug!(
            id = %id,
            name = %self.name,
            log_file = %log_file.display(),
            "work item created"
        );

        WorkItem {
            id,
            name: self.name,
            script: self.script,
            payload: self.payload,
            args: self.args,
            timeout: self.timeout,
            created_at,
            arg_file,
            log_file,
            sink: MessageSink::new(self.sink_capacity),
            status: Mutex::new(WorkStatus::Idle),
            span,
        }
    }
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of work. Share it with `Arc`; all mutation goes through
/// [`WorkItem::mark_running`] and [`WorkItem::terminate`].
#[derive(Debug)]
pub struct WorkItem {
    id: WorkId,
    name: String,
    script: PathBuf,
    payload: String,
    args: Vec<String>,
    timeout: u64,
    created_at: DateTime<Local>,
    arg_file: PathBuf,
    log_file: PathBuf,
    sink: MessageSink,
    status: Mutex<WorkStatus>,
    span: Span,
}

impl WorkItem {
    pub fn id(&self) -> WorkId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Time budget in seconds. Enforced by the executor, not here.
    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn arg_file(&self) -> &Path {
        &self.arg_file
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn sink(&self) -> &MessageSink {
        &self.sink
    }

    /// Execution span; the executor instruments its run with it.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Current status.
    pub fn status(&self) -> WorkStatus {
        self.lock_status().clone()
    }

    /// The error of a failed run, if the item ended in `Error`.
    pub fn error(&self) -> Option<ExecutionError> {
        match &*self.lock_status() {
            WorkStatus::Error(e) => Some(e.clone()),
            _ => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.lock_status().is_terminal()
    }

    /// Move from `Idle` to `Running`.
    pub fn mark_running(&self) -> Result<()> {
        {
            let mut status = self.lock_status();
            if *status != WorkStatus::Idle {
                return Err(Error::InvalidTransition {
                    from: status.to_string(),
                    to: WorkStatus::Running.to_string(),
                });
            }
            *status = WorkStatus::Running;
        }

        record_state_transition(&self.span, "idle", "running");
        debug!(id = %self.id, name = %self.name, "work item running");
        Ok(())
    }

    /// Record the outcome of the run and close the message sink.
    ///
    /// A failed outcome is stored and handed back as
    /// [`Error::Execution`]. Only the first call takes effect; later calls
    /// leave the stored outcome untouched and return
    /// [`Error::AlreadyTerminated`].
    pub fn terminate(&self, result: std::result::Result<(), ExecutionError>) -> Result<()> {
        let from = {
            let mut status = self.lock_status();
            if status.is_terminal() {
                let current = status.clone();
                drop(status);
                warn!(
                    id = %self.id,
                    name = %self.name,
                    status = %current,
                    "work item terminated twice"
                );
                return Err(Error::AlreadyTerminated {
                    id: self.id,
                    status: current,
                });
            }
            let from = status.as_str();
            *status = match &result {
                Ok(()) => WorkStatus::Success,
                Err(e) => WorkStatus::Error(e.clone()),
            };
            from
        };

        self.sink.close();

        match result {
            Ok(()) => {
                record_state_transition(&self.span, from, "success");
                metrics::work_terminated().add(1, &[KeyValue::new("result", "success")]);
                info!(
                    id = %self.id,
                    name = %self.name,
                    "hook {}#{} done [SUCCESS]",
                    self.name,
                    self.id
                );
                Ok(())
            }
            Err(e) => {
                record_state_transition(&self.span, from, "error");
                metrics::work_terminated().add(1, &[KeyValue::new("result", "error")]);
                info!(
                    id = %self.id,
                    name = %self.name,
                    error = %e,
                    "hook {}#{} done [ERROR]",
                    self.name,
                    self.id
                );
                Err(Error::Execution(e))
            }
        }
    }

    /// Lines of the log file starting with `prefix`, prefix and leading
    /// spaces removed. See [`crate::logs::extract_log`].
    pub fn log_content(&self, prefix: &str) -> Result<String> {
        crate::logs::extract_log(&self.log_file, prefix)
    }

    /// Point-in-time view for status consumers.
    pub fn snapshot(&self) -> WorkSnapshot {
        WorkSnapshot {
            id: self.id,
            name: self.name.clone(),
            status: self.status(),
            created_at: self.created_at,
            log_file: self.log_file.clone(),
        }
    }

    // Every critical section is one clone or one assignment, so a poisoned
    // lock still guards a consistent value.
    fn lock_status(&self) -> MutexGuard<'_, WorkStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serializable view of a work item.
///
/// The status is flattened: `"status": "error"` sits next to `"id"`, and a
/// failed item adds an `"error"` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSnapshot {
    pub id: WorkId,
    pub name: String,
    #[serde(flatten)]
    pub status: WorkStatus,
    pub created_at: DateTime<Local>,
    pub log_file: PathBuf,
}
