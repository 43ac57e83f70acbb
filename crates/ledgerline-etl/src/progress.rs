//! Progress reporting hooks.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives progress ticks from the workers.
///
/// Ticks arrive from several threads at once and must return promptly.
pub trait ProgressSink: Send + Sync + Debug {
    /// `current` files of `total` have been handled.
    fn tick(&self, current: usize, total: usize);

    /// Called once after every worker has finished.
    fn finish(&self, _total: usize) {}
}

/// A sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn tick(&self, _current: usize, _total: usize) {}
}

/// Turns per-file completions into monotonically increasing ticks.
#[derive(Debug)]
pub(crate) struct ProgressCounter<'a> {
    sink: &'a dyn ProgressSink,
    done: AtomicUsize,
    total: usize,
}

impl<'a> ProgressCounter<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, total: usize) -> Self {
        Self {
            sink,
            done: AtomicUsize::new(0),
            total,
        }
    }

    /// Count one more handled file and report it.
    pub(crate) fn advance(&self) {
        let current = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        self.sink.tick(current, self.total);
    }

    pub(crate) fn finish(&self) {
        self.sink.finish(self.total);
    }
}
