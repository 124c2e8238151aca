use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identity of a job, unique per [`JobIdAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues monotonically increasing job ids.
///
/// Owned by whoever creates jobs (usually the scheduler) and shared by
/// reference, so two schedulers never contend on one counter.
#[derive(Debug)]
pub struct JobIdAllocator {
    next: AtomicU64,
}

impl JobIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> JobId {
        JobId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for JobIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
