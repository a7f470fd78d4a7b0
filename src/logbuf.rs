//! Bounded, run-scoped log buffer.
//!
//! The operator-visible trail of a run lives here instead of in ambient
//! global storage: each run owns its own buffer and hands the entries over
//! inside the final report. Capacity is fixed; the oldest entries are evicted
//! once it is reached.

use std::collections::VecDeque;

use chrono::Utc;
use tracing::debug;

/// Default entry capacity for a run's log buffer.
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Ring buffer of timestamped log lines for one acquisition run.
#[derive(Debug)]
pub struct RunLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl RunLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    /// Append a timestamped entry, evicting the oldest at capacity.
    pub fn push(&mut self, message: &str) {
        debug!("{}", message);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries
            .push_back(format!("{} {}", Utc::now().format("%H:%M:%S%.3f"), message));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the buffer, oldest entry first.
    pub fn into_entries(self) -> Vec<String> {
        self.entries.into_iter().collect()
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
