//! Process-wide work identifiers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static LAST_WORK_ID: AtomicU64 = AtomicU64::new(0);

/// Newtype for work item IDs. Unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub u64);

impl WorkId {
    /// Issue the next identifier. The first call in a process returns 1.
    pub fn next() -> Self {
        Self(next_id())
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Atomically bump the shared counter. Each value is handed out exactly
/// once; concurrent callers are not ordered relative to each other.
pub fn next_id() -> u64 {
    LAST_WORK_ID.fetch_add(1, Ordering::Relaxed) + 1
}
