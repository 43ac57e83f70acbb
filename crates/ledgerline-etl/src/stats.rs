//! Run counters shared by all workers.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;

/// Point-in-time copy of the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub new_files: u64,
    pub updated_files: u64,
    pub new_images: u64,
    pub errors: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} new, {} updated, {} new images, {} errors",
            self.new_files, self.updated_files, self.new_images, self.errors
        )
    }
}

/// Counters for one run.
#[derive(Debug, Default)]
pub struct RunStatistics {
    counters: Mutex<StatsSnapshot>,
}

impl RunStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_new_file(&self) {
        self.counters.lock().new_files += 1;
    }

    pub fn record_updated_file(&self) {
        self.counters.lock().updated_files += 1;
    }

    pub fn record_new_image(&self) {
        self.counters.lock().new_images += 1;
    }

    pub fn record_error(&self) {
        self.counters.lock().errors += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.counters.lock()
    }
}
