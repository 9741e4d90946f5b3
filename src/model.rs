//! Core data model.
//!
//! A work item is one invocation of a hook script. It has identity (a
//! process-wide id), a pair of files named after it, and a guarded
//! lifecycle status.

pub mod id;
pub mod naming;
pub mod work;

pub use id::{WorkId, next_id};
pub use work::{ExecutionError, NewWorkItem, WorkItem, WorkSnapshot, WorkStatus};
