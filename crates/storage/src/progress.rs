//! Byte-level progress reporting.
//!
//! Backends report the *cumulative* number of bytes transferred for the item
//! currently in flight. Consumers only rely on ordering: values for one item
//! never decrease.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Receives cumulative byte counts from a transfer.
///
/// Implementations must be cheap and must not block: reports may arrive for
/// every chunk a backend sends or receives.
pub trait ProgressSink: Send + Sync {
    fn report(&self, bytes: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64) + Send + Sync,
{
    fn report(&self, bytes: u64) {
        self(bytes)
    }
}

impl ProgressSink for watch::Sender<u64> {
    fn report(&self, bytes: u64) {
        // Nobody listening is fine.
        self.send_replace(bytes);
    }
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;
impl ProgressSink for NoProgress {
    fn report(&self, _bytes: u64) {}
}

/// Forwards reports to `inner` only when they advance past the highest value
/// seen so far, so a consumer never observes progress going backwards within
/// one item (retried chunks inside an SDK can otherwise re-report lower
/// totals).
pub struct Monotonic<'a> {
    inner: &'a dyn ProgressSink,
    highest: AtomicU64,
}
impl<'a> Monotonic<'a> {
    pub fn new(inner: &'a dyn ProgressSink) -> Self {
        Self { inner, highest: AtomicU64::new(0) }
    }

    /// Highest value forwarded so far.
    pub fn highest(&self) -> u64 {
        self.highest.load(Ordering::Acquire)
    }
}
impl ProgressSink for Monotonic<'_> {
    fn report(&self, bytes: u64) {
        let previous = self.highest.fetch_max(bytes, Ordering::AcqRel);
        if bytes > previous || (bytes == 0 && previous == 0) {
            self.inner.report(bytes);
        }
    }
}
