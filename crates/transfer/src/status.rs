//! Task status snapshots and aggregate progress.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use strata_storage::progress::ProgressSink;
use tokio::sync::watch;

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}
impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Latest known state of a task, as published to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    /// Human-readable description of what the task is doing.
    pub text: String,
    /// Fraction of bytes done, in `[0, 1]`.
    pub progress: f64,
    /// Items finished so far.
    pub completed: usize,
    /// Items in the task.
    pub total: usize,
    pub state: TaskState,
}
impl TaskStatus {
    pub(crate) fn starting(text: impl Into<String>, total: usize) -> Self {
        Self {
            text: text.into(),
            progress: 0.0,
            completed: 0,
            total,
            state: TaskState::Running,
        }
    }
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded { total: usize },
    /// The first failing item aborted the rest of the task.
    Failed { message: String, completed: usize, total: usize },
    /// Stopped on request; items finished before the stop stay done.
    Cancelled { completed: usize, total: usize },
}
impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            Self::Succeeded { .. } => TaskState::Succeeded,
            Self::Failed { .. } => TaskState::Failed,
            Self::Cancelled { .. } => TaskState::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Publishes a task's status and folds per-item byte counts into the task's
/// aggregate progress.
///
/// Progress is `(bytes of finished items + bytes of the in-flight item) /
/// total bytes`, recomputed on every report. As a [`ProgressSink`] it
/// receives the in-flight item's cumulative byte count from the backend.
pub(crate) struct Reporter {
    status: watch::Sender<TaskStatus>,
    total_bytes: AtomicU64,
    finished_bytes: AtomicU64,
    in_flight_bytes: AtomicU64,
    in_flight_length: AtomicU64,
    completed: AtomicUsize,
}

impl Reporter {
    pub(crate) fn new(status: watch::Sender<TaskStatus>, total_bytes: u64) -> Self {
        Self {
            status,
            total_bytes: AtomicU64::new(total_bytes),
            finished_bytes: AtomicU64::new(0),
            in_flight_bytes: AtomicU64::new(0),
            in_flight_length: AtomicU64::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn total(&self) -> usize {
        self.status.borrow().total
    }

    /// Replace the item count and byte total once they are known, after
    /// directories have been expanded.
    pub(crate) fn set_total(&self, total: usize, total_bytes: u64) {
        self.total_bytes.store(total_bytes, Ordering::Release);
        self.status.send_modify(|status| status.total = total);
    }

    pub(crate) fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.status.send_modify(|status| status.text = text);
    }

    /// Start the next item, `length` bytes long.
    pub(crate) fn begin_item(&self, length: u64, text: impl Into<String>) {
        self.in_flight_length.store(length, Ordering::Release);
        self.in_flight_bytes.store(0, Ordering::Release);
        let text = text.into();
        let progress = self.progress();
        self.status.send_modify(|status| {
            status.text = text;
            status.progress = progress;
        });
    }

    /// Mark the in-flight item as done.
    pub(crate) fn finish_item(&self) {
        self.finish_items(1);
    }

    /// Mark the in-flight work as done, counting it as `count` items (a batch
    /// delete finishes many keys in one backend call).
    pub(crate) fn finish_items(&self, count: usize) {
        let length = self.in_flight_length.swap(0, Ordering::AcqRel);
        self.in_flight_bytes.store(0, Ordering::Release);
        self.finished_bytes.fetch_add(length, Ordering::AcqRel);
        let completed = self.completed.fetch_add(count, Ordering::AcqRel) + count;
        let progress = self.progress();
        self.status.send_modify(|status| {
            status.completed = completed;
            status.progress = progress;
        });
    }

    /// Aggregate progress so far.
    pub(crate) fn progress(&self) -> f64 {
        let total_bytes = self.total_bytes.load(Ordering::Acquire);
        if total_bytes == 0 {
            return 0.0;
        }
        let done = self.finished_bytes.load(Ordering::Acquire) + self.in_flight_bytes.load(Ordering::Acquire);
        (done as f64 / total_bytes as f64).clamp(0.0, 1.0)
    }

    /// Publish the terminal status.
    pub(crate) fn finish(&self, outcome: &TaskOutcome, text: impl Into<String>) {
        let text = text.into();
        let progress = match outcome {
            TaskOutcome::Succeeded { .. } => 1.0,
            _ => self.progress(),
        };
        let completed = self.completed();
        self.status.send_modify(|status| {
            status.text = text;
            status.progress = progress;
            status.completed = completed;
            status.state = outcome.state();
        });
    }
}

impl ProgressSink for Reporter {
    fn report(&self, bytes: u64) {
        // Backends may overshoot a stale length; never count more than the item.
        let bytes = bytes.min(self.in_flight_length.load(Ordering::Acquire));
        let previous = self.in_flight_bytes.fetch_max(bytes, Ordering::AcqRel);
        if bytes > previous {
            let progress = self.progress();
            self.status.send_modify(|status| status.progress = progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter(total_items: usize, total_bytes: u64) -> (Reporter, watch::Receiver<TaskStatus>) {
        let (tx, rx) = watch::channel(TaskStatus::starting("test", total_items));
        (Reporter::new(tx, total_bytes), rx)
    }

    #[test]
    fn test_aggregate_progress() {
        let (reporter, rx) = reporter(2, 100);
        reporter.begin_item(25, "first");
        reporter.report(10);
        assert_eq!(rx.borrow().progress, 0.10);
        reporter.report(25);
        reporter.finish_item();
        assert_eq!(rx.borrow().completed, 1);
        assert_eq!(rx.borrow().progress, 0.25);

        reporter.begin_item(75, "second");
        reporter.report(50);
        assert_eq!(rx.borrow().progress, 0.75);
        assert_eq!(rx.borrow().text, "second");
    }

    #[test]
    fn test_in_flight_never_regresses_or_overshoots() {
        let (reporter, rx) = reporter(1, 10);
        reporter.begin_item(10, "only");
        reporter.report(8);
        reporter.report(4);
        assert_eq!(rx.borrow().progress, 0.8);
        reporter.report(1_000);
        assert_eq!(rx.borrow().progress, 1.0);
    }

    #[test]
    fn test_zero_bytes_succeeds_at_one() {
        let (reporter, rx) = reporter(1, 0);
        reporter.begin_item(0, "empty");
        reporter.report(0);
        assert_eq!(rx.borrow().progress, 0.0);
        reporter.finish_item();
        reporter.finish(&TaskOutcome::Succeeded { total: 1 }, "done");
        let status = rx.borrow();
        assert_eq!(status.progress, 1.0);
        assert_eq!(status.state, TaskState::Succeeded);
        assert!(status.state.is_terminal());
    }

    #[test]
    fn test_failure_keeps_partial_progress() {
        let (reporter, rx) = reporter(2, 10);
        reporter.begin_item(5, "first");
        reporter.report(5);
        reporter.finish_item();
        let outcome = TaskOutcome::Failed { message: "boom".to_string(), completed: 1, total: 2 };
        reporter.finish(&outcome, "failed");
        assert_eq!(rx.borrow().progress, 0.5);
        assert_eq!(rx.borrow().state, TaskState::Failed);
    }

    #[test]
    fn test_totals_known_late() {
        let (reporter, rx) = reporter(0, 0);
        reporter.set_total(2, 8);
        assert_eq!(reporter.total(), 2);
        reporter.begin_item(4, "first");
        reporter.report(2);
        assert_eq!(rx.borrow().progress, 0.25);
        assert_eq!(rx.borrow().total, 2);
    }
}
