//! Progress accounting for chapter downloads.
//!
//! [Progress] is the context object the runner updates once per settled task; a
//! [ProgressSink] decides how (and whether) to show it.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Receives `(completed, total)` after every settlement, in settlement order.
pub trait ProgressSink {
    fn on_task_settled(&self, completed: usize, total: usize);

    /// Called once after the last task settled.
    fn finish(&self) {}
}

/// Discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_task_settled(&self, _completed: usize, _total: usize) {}
}

/// In-place `completed/total finished` line on stderr.
#[derive(Debug)]
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::default_spinner().template("{pos}/{len} finished ({elapsed})") {
            bar.set_style(style);
        }
        Self { bar }
    }

    /// Handle to the underlying bar, for output that must not interleave with it.
    pub fn bar(&self) -> ProgressBar {
        self.bar.clone()
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_task_settled(&self, completed: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(completed as u64);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Completed/total counter for one runner invocation.
pub struct Progress<'a> {
    completed: usize,
    total: usize,
    sink: &'a dyn ProgressSink,
}

impl<'a> Progress<'a> {
    pub fn new(total: usize, sink: &'a dyn ProgressSink) -> Self {
        Self {
            completed: 0,
            total,
            sink,
        }
    }

    /// Record one settled task and notify the sink.
    pub fn settle(&mut self) {
        self.completed += 1;
        self.sink.on_task_settled(self.completed, self.total);
        if self.completed == self.total {
            self.sink.finish();
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
